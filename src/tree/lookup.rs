//! Queries the transfer layer makes against a finalized tree.
//!
//! These answer GET_DESCRIPTOR requests and tell the hardware layer which
//! endpoints a SET_CONFIGURATION or SET_INTERFACE enables.

use super::{ConfigurationId, DescriptorTree, EndpointOwner, Node};
use crate::descriptors::{Configuration, Device, Endpoint, StringZero};

impl DescriptorTree {
    /// Find the node a GET_DESCRIPTOR request for (`descriptor_type`,
    /// `index`, `language`) refers to.
    ///
    /// Configurations are indexed from 0 in the order they were attached.
    /// String index 0 is string descriptor zero. For other strings, when
    /// there is none in `language` the first one attached under that index is
    /// returned. `None` if the tree is not finalized or has no such
    /// descriptor.
    pub fn lookup(&self, descriptor_type: u8, index: u8, language: u16) -> Option<Node> {
        if !self.is_finalized() {
            return None;
        }

        match descriptor_type {
            Device::DESCRIPTOR_TYPE => Some(Node::Device),
            Configuration::DESCRIPTOR_TYPE => self
                .configurations
                .get(index as usize)
                .map(|&id| Node::Configuration(id)),
            StringZero::DESCRIPTOR_TYPE if index == 0 => {
                self.string_zero.as_ref().map(|_| Node::StringZero)
            }
            StringZero::DESCRIPTOR_TYPE => self.lookup_string(index, language),
            _ => None,
        }
    }

    fn lookup_string(&self, index: u8, language: u16) -> Option<Node> {
        let mut candidates = self
            .string_nodes
            .iter()
            .enumerate()
            .filter(|(_, s)| s.index == index)
            .map(|(i, s)| (super::StringId(i as u16), s))
            .filter(|&(id, _)| self.contains(Node::String(id)));

        let first = candidates.next()?;
        if first.1.record.has_language(language) {
            return Some(Node::String(first.0));
        }
        let id = candidates
            .find(|(_, s)| s.record.has_language(language))
            .map_or(first.0, |(id, _)| id);
        Some(Node::String(id))
    }

    /// The configuration a SET_CONFIGURATION with `value` selects.
    ///
    /// Value 0 puts the device back in the address state and has no
    /// configuration.
    pub fn configuration_by_value(&self, value: u8) -> Option<ConfigurationId> {
        if !self.is_finalized() || value == 0 {
            return None;
        }
        self.configurations.get(value as usize - 1).copied()
    }

    /// The interface or alternate setting selected by
    /// `(interface_number, alternate_setting)` in the configuration with
    /// `configuration_value`.
    pub fn interface_setting(
        &self,
        configuration_value: u8,
        interface_number: u8,
        alternate_setting: u8,
    ) -> Option<EndpointOwner> {
        let configuration = self.configuration_by_value(configuration_value)?;
        let interface = *self
            .configuration_nodes
            .get(configuration.index())?
            .interfaces
            .get(interface_number as usize)?;

        match alternate_setting {
            0 => Some(EndpointOwner::Interface(interface)),
            n => self
                .interface_nodes
                .get(interface.index())?
                .alternates
                .get(n as usize - 1)
                .map(|&a| EndpointOwner::Alternate(a)),
        }
    }

    /// Endpoints to enable for an interface setting, in attachment order.
    pub fn active_endpoints(
        &self,
        configuration_value: u8,
        interface_number: u8,
        alternate_setting: u8,
    ) -> Option<impl Iterator<Item = &Endpoint> + '_> {
        let owner =
            self.interface_setting(configuration_value, interface_number, alternate_setting)?;
        let setting = self.setting(owner).ok()?;
        Some(
            setting
                .endpoints
                .iter()
                .filter_map(|&e| self.endpoint_nodes.get(e.index()))
                .map(|n| &n.record),
        )
    }

    /// Sum of the `wTotalLength` of every configuration.
    pub fn total_length(&self) -> usize {
        self.configurations
            .iter()
            .filter_map(|&id| self.configuration_nodes.get(id.index()))
            .map(|c| c.derived.wTotalLength as usize)
            .sum()
    }
}
