#![no_std]

//! USB descriptor trees for device firmware.
//!
//! Descriptors are described as records and attached into a
//! [`DescriptorTree`]. [`DescriptorTree::finalize`] numbers everything and
//! computes lengths once, after which the tree is read-only and
//! [`DescriptorTree::serialize_subtree`] produces the bytes a host receives
//! for GET_DESCRIPTOR.

extern crate alloc;

// Must come first so the log macros are visible in the other modules.
#[macro_use]
mod fmt;

pub mod codec;
pub mod descriptors;
mod error;
pub mod tree;

pub use error::Error;
pub use tree::{
    AlternateId, ConfigurationId, DescriptorTree, EndpointId, EndpointOwner, InterfaceId, Node,
    StringId, StringOwner,
};
