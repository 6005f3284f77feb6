//! Built-in plugins
//!
//! The four internal UIDs every project can rely on. Each module pairs a
//! descriptor (parameter schema) with a [`Processor`] implementation that
//! is allocation-free after `prepare`.

mod chorus;
mod eq;
mod reverb;
mod ultrasound;

pub use chorus::Chorus;
pub use eq::FourBandEq;
pub use reverb::Reverb;
pub use ultrasound::Ultrasound;

use stu_audio::Processor;

use crate::api::PluginDescriptor;

pub const ULTRASOUND_UID: &str = "internal:ultrasound";
pub const EQ_UID: &str = "internal:tracktion:4bandEq";
pub const REVERB_UID: &str = "internal:tracktion:reverb";
pub const CHORUS_UID: &str = "internal:tracktion:chorus";

/// Descriptors for every built-in, in stable order
pub fn descriptors() -> Vec<PluginDescriptor> {
    vec![
        Ultrasound::descriptor(),
        FourBandEq::descriptor(),
        Reverb::descriptor(),
        Chorus::descriptor(),
    ]
}

/// Instantiate a built-in by uid
pub fn instantiate(uid: &str) -> Option<(PluginDescriptor, Box<dyn Processor>)> {
    match uid {
        ULTRASOUND_UID => Some((Ultrasound::descriptor(), Box::new(Ultrasound::new()))),
        EQ_UID => Some((FourBandEq::descriptor(), Box::new(FourBandEq::new()))),
        REVERB_UID => Some((Reverb::descriptor(), Box::new(Reverb::new()))),
        CHORUS_UID => Some((Chorus::descriptor(), Box::new(Chorus::new()))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PluginKind;

    #[test]
    fn all_builtins_instantiate() {
        for descriptor in descriptors() {
            let (d, _processor) = instantiate(&descriptor.uid).unwrap();
            assert_eq!(d.uid, descriptor.uid);
            assert!(d.is_native);
            assert!(!d.parameters.is_empty());
        }
    }

    #[test]
    fn ultrasound_is_the_only_instrument() {
        let instruments: Vec<_> = descriptors()
            .into_iter()
            .filter(|d| d.kind == PluginKind::Instrument)
            .collect();
        assert_eq!(instruments.len(), 1);
        assert_eq!(instruments[0].uid, ULTRASOUND_UID);
    }

    #[test]
    fn unknown_uid_is_none() {
        assert!(instantiate("internal:nope").is_none());
        assert!(instantiate("vst3:whatever").is_none());
    }

    #[test]
    fn defaults_are_normalized() {
        for descriptor in descriptors() {
            for param in &descriptor.parameters {
                assert!(
                    (0.0..=1.0).contains(&param.default),
                    "{}.{} default {} out of range",
                    descriptor.uid,
                    param.id,
                    param.default
                );
            }
        }
    }
}
