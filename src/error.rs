use crate::descriptors::DescriptorKind;
use crate::tree::{ConfigurationId, Node};

/// Failures raised while building, finalizing or serializing a descriptor tree.
///
/// All of these are configuration mistakes made by the integrator, never
/// transient conditions, so none of them are worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Static fields of a record violate the USB rules for its kind.
    ///
    /// `node` is `None` when the record was rejected by its constructor,
    /// before it had a place in a tree.
    #[error("invalid {kind:?} descriptor (node {node:?})")]
    InvalidDescriptor {
        kind: DescriptorKind,
        node: Option<Node>,
    },

    #[error("{0:?} is already attached to a parent")]
    AlreadyOwned(Node),

    /// Two endpoints with the same `bEndpointAddress` under one interface
    /// or alternate interface.
    #[error("endpoint address {address:#04x} is already used by this owner")]
    DuplicateEndpointAddress { address: u8 },

    /// Strings are attached somewhere but the device has no language table.
    #[error("strings are used but the device has no string descriptor zero")]
    MissingStringZero,

    #[error("descriptor tree is already finalized")]
    AlreadyFinalized,

    #[error("descriptor tree is not finalized")]
    NotFinalized,

    #[error("buffer too small: {needed} bytes needed, {available} available")]
    BufferTooSmall { needed: usize, available: usize },

    /// The handle does not refer to a node of this tree.
    #[error("{0:?} does not belong to this tree")]
    UnknownNode(Node),

    #[error("device has no configurations")]
    NoConfigurations,

    #[error("{0:?} has no interfaces")]
    NoInterfaces(ConfigurationId),

    /// Two strings in the same language were attached to one owner.
    #[error("language {language:#06x} is already present for this string")]
    DuplicateLanguage { language: u16 },

    /// A string is written in a language missing from string descriptor zero.
    #[error("language {language:#06x} is not listed in string descriptor zero")]
    UnsupportedLanguage { language: u16 },

    /// A count or length no longer fits the width of its descriptor field.
    #[error("{0:?} overflows a descriptor field")]
    Overflow(Node),
}
