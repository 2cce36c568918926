//! Built-in capabilities.

use super::{contracts, RegistryBuilder, ResourceContext};
use crate::codec::{self, JsonCodec, MsgPackCodec, ObjectCodec, RawCodec};
use crate::error::Result;
use crate::extension::{self, ExtensionFactory, ValidationPolicyFactory};
use crate::protocol::{
    self, DirectProtocol, EndMarkerProtocol, FramingProtocol, LengthPrefixedProtocol,
    NegotiatedProtocol,
};

fn framing_provider<P: FramingProtocol + Default + 'static>() -> Result<Box<dyn FramingProtocol>> {
    Ok(Box::new(P::default()))
}

fn codec_provider<C: ObjectCodec + Default + 'static>() -> Result<Box<dyn ObjectCodec>> {
    Ok(Box::new(C::default()))
}

fn validation_policy() -> Result<Box<dyn ExtensionFactory>> {
    Ok(Box::new(ValidationPolicyFactory))
}

pub(super) fn register(builder: RegistryBuilder) -> RegistryBuilder {
    let defaults = ResourceContext::new(&builder.default_context)
        .declare(
            contracts::FRAMING_PROTOCOL,
            &[
                protocol::ids::LENGTH_PREFIXED,
                protocol::ids::END_MARKER,
                protocol::ids::DIRECT,
                protocol::ids::NEGOTIATED,
            ],
        )
        .declare(
            contracts::OBJECT_CODEC,
            &[codec::ids::RAW, codec::ids::MSGPACK, codec::ids::JSON],
        )
        .declare(
            contracts::EXTENSION_FACTORY,
            &[extension::ids::VALIDATION_POLICY],
        );

    builder
        .contract::<dyn FramingProtocol>(contracts::FRAMING_PROTOCOL)
        .contract::<dyn ObjectCodec>(contracts::OBJECT_CODEC)
        .contract::<dyn ExtensionFactory>(contracts::EXTENSION_FACTORY)
        .provider(protocol::ids::DIRECT, framing_provider::<DirectProtocol>)
        .provider(protocol::ids::LENGTH_PREFIXED, framing_provider::<LengthPrefixedProtocol>)
        .provider(protocol::ids::END_MARKER, framing_provider::<EndMarkerProtocol>)
        .provider(protocol::ids::NEGOTIATED, framing_provider::<NegotiatedProtocol>)
        .provider(codec::ids::RAW, codec_provider::<RawCodec>)
        .provider(codec::ids::MSGPACK, codec_provider::<MsgPackCodec>)
        .provider(codec::ids::JSON, codec_provider::<JsonCodec>)
        .provider(extension::ids::VALIDATION_POLICY, validation_policy)
        .context(defaults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::CapabilityRegistry;

    #[test]
    fn test_builtin_protocols_discoverable() {
        let registry = CapabilityRegistry::with_builtins().unwrap();

        let names: Vec<&str> = registry
            .lookup_providers::<dyn FramingProtocol>()
            .iter()
            .map(|p| p.unwrap().name())
            .collect();
        assert_eq!(names, vec!["length-prefixed", "end-marker", "direct", "negotiated"]);
    }

    #[test]
    fn test_builtin_codecs_discoverable() {
        let registry = CapabilityRegistry::with_builtins().unwrap();

        let codecs = registry.lookup_providers::<dyn ObjectCodec>();
        assert_eq!(codecs.len(), 3);
        assert!(codecs.iter().all(|c| c.is_ok()));
    }

    #[test]
    fn test_builtins_follow_default_context_name() {
        let registry = RegistryBuilder::new()
            .default_context("gateway")
            .with_builtins()
            .build()
            .unwrap();

        assert_eq!(registry.lookup_providers::<dyn ObjectCodec>().len(), 3);
        assert!(registry
            .lookup_providers_in::<dyn ObjectCodec>("default")
            .is_empty());
    }
}
