//! Wire encoding of finalized subtrees.

use super::{DescriptorTree, EndpointOwner, Node};
use crate::codec::Writer;
use crate::descriptors::{DescriptorKind, Device, Endpoint};
use crate::Error;

impl DescriptorTree {
    /// Number of bytes [`serialize_subtree`](Self::serialize_subtree) writes
    /// for `node`.
    ///
    /// For a configuration this is its `wTotalLength`. For an interface or
    /// alternate setting it is the interface descriptor plus its endpoints.
    pub fn subtree_len(&self, node: Node) -> Result<usize, Error> {
        self.check_finalized()?;
        if !self.contains(node) {
            return Err(Error::UnknownNode(node));
        }
        Ok(match node {
            Node::Device => Device::LEN,
            Node::StringZero => self.string_zero.as_ref().map_or(0, |s| s.len()),
            Node::Configuration(id) => self.configuration_node(id)?.derived.wTotalLength as usize,
            Node::Interface(id) => self.setting(id.into())?.len as usize,
            Node::Alternate(id) => self.setting(id.into())?.len as usize,
            Node::Endpoint(_) => Endpoint::LEN,
            Node::String(id) => self.string_node(id)?.record.len(),
        })
    }

    /// Write the descriptors of `node` and everything below it to `out`, in
    /// the order a host expects them.
    ///
    /// Returns the number of bytes written. If `out` is too short, nothing is
    /// written and [`Error::BufferTooSmall`] reports the size needed.
    pub fn serialize_subtree(&self, node: Node, out: &mut [u8]) -> Result<usize, Error> {
        let needed = self.subtree_len(node)?;
        if out.len() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                available: out.len(),
            });
        }

        let mut w = Writer::new(out);
        self.encode(node, &mut w)?;
        debug_assert_eq!(w.len(), needed);
        Ok(w.len())
    }

    fn check_valid(&self, node: Node) -> Result<(), Error> {
        let (kind, valid) = match node {
            Node::Device => (DescriptorKind::Device, self.device.is_valid()),
            Node::StringZero => {
                let s = self.string_zero.as_ref().ok_or(Error::UnknownNode(node))?;
                (DescriptorKind::StringZero, s.is_valid())
            }
            Node::Configuration(id) => (
                DescriptorKind::Configuration,
                self.configuration_node(id)?.record.is_valid(),
            ),
            Node::Interface(id) => (
                DescriptorKind::Interface,
                self.setting(id.into())?.record.is_valid(),
            ),
            Node::Alternate(id) => (
                DescriptorKind::AlternateInterface,
                self.setting(id.into())?.record.is_valid(),
            ),
            Node::Endpoint(id) => (
                DescriptorKind::Endpoint,
                self.endpoint_node(id)?.record.is_valid(),
            ),
            Node::String(id) => (DescriptorKind::String, self.string_node(id)?.record.is_valid()),
        };
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidDescriptor {
                kind,
                node: Some(node),
            })
        }
    }

    fn encode(&self, node: Node, w: &mut Writer) -> Result<(), Error> {
        self.check_valid(node)?;
        match node {
            Node::Device => self.device.encode(w, &self.device_derived),
            Node::StringZero => {
                let s = self.string_zero.as_ref().ok_or(Error::UnknownNode(node))?;
                s.encode(w)
            }
            Node::Configuration(id) => {
                let configuration = self.configuration_node(id)?;
                configuration.record.encode(w, &configuration.derived)?;
                for &interface in &configuration.interfaces {
                    self.encode(Node::Interface(interface), w)?;
                    for &alternate in &self.interface_node(interface)?.alternates {
                        self.encode(Node::Alternate(alternate), w)?;
                    }
                }
                Ok(())
            }
            Node::Interface(id) => self.encode_setting(id.into(), w),
            Node::Alternate(id) => self.encode_setting(id.into(), w),
            Node::Endpoint(id) => self.endpoint_node(id)?.record.encode(w),
            Node::String(id) => self.string_node(id)?.record.encode(w),
        }
    }

    /// An interface descriptor followed by its endpoints.
    fn encode_setting(&self, owner: EndpointOwner, w: &mut Writer) -> Result<(), Error> {
        let setting = self.setting(owner)?;
        setting.record.encode(w, &setting.derived)?;
        for &endpoint in &setting.endpoints {
            self.encode(Node::Endpoint(endpoint), w)?;
        }
        Ok(())
    }
}
