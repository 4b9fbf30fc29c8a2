//! One-shot numbering pass.
//!
//! Walks the attached tree in attachment order and fills in every derived
//! field: counts, configuration values, interface numbers, alternate
//! settings, string indices and total lengths. Records are validated on the
//! way, so a finalized tree only ever serializes well-formed descriptors.

use scopeguard::ScopeGuard;

use super::{ConfigurationId, DescriptorTree, EndpointOwner, Node, State, StringId, StringNode};
use crate::descriptors::{
    Configuration, ConfigurationDerived, DescriptorKind, Endpoint, Interface, InterfaceDerived,
    StringZero, MANUFACTURER_STRING_INDEX, PRODUCT_STRING_INDEX, SERIAL_NUMBER_STRING_INDEX,
    USER_STRING_INDEX_BEGIN,
};
use crate::Error;

fn invalid(kind: DescriptorKind, node: Node) -> Error {
    Error::InvalidDescriptor { kind, node: Some(node) }
}

fn count(n: usize, node: Node) -> Result<u8, Error> {
    u8::try_from(n).map_err(|_| Error::Overflow(node))
}

/// Check every string of one collection and give them all `index`.
fn assign_strings(
    strings: &[StringId],
    nodes: &mut [StringNode],
    string_zero: Option<&StringZero>,
    index: u8,
) -> Result<(), Error> {
    for &id in strings {
        let node = nodes.get_mut(id.index()).ok_or(Error::UnknownNode(Node::String(id)))?;
        if !node.record.is_valid() {
            return Err(invalid(DescriptorKind::String, Node::String(id)));
        }
        let string_zero = string_zero.ok_or(Error::MissingStringZero)?;
        let language = node.record.language();
        if !string_zero.has_language(language) {
            return Err(Error::UnsupportedLanguage { language });
        }
        node.index = index;
        trace!("string {} ({}) has index {}", id, language, index);
    }
    Ok(())
}

/// Next free index for configuration and interface strings.
struct StringIndices {
    next: Option<u8>,
}

impl StringIndices {
    fn take(&mut self, owner: Node) -> Result<u8, Error> {
        let index = self.next.ok_or(Error::Overflow(owner))?;
        self.next = index.checked_add(1);
        Ok(index)
    }
}

impl DescriptorTree {
    /// Validate the tree and compute all derived fields.
    ///
    /// Runs once. On success the tree is frozen and can be serialized. On
    /// failure it is left unusable and a new tree has to be built. Either way
    /// a second call returns [`Error::AlreadyFinalized`].
    pub fn finalize(&mut self) -> Result<(), Error> {
        self.check_setup()?;
        self.state = State::Finalizing;
        debug!("finalizing {} configurations", self.configurations.len());

        let mut tree = scopeguard::guard(self, |tree| {
            tree.state = State::Failed;
        });

        if let Err(e) = tree.number() {
            warn!("finalize failed: {}", e);
            return Err(e);
        }

        let tree = ScopeGuard::into_inner(tree);
        tree.state = State::Finalized;
        debug!(
            "finalized {} configurations, {} bytes of configuration descriptors",
            tree.device_derived.bNumConfigurations,
            tree.total_length()
        );
        Ok(())
    }

    fn number(&mut self) -> Result<(), Error> {
        if !self.device.is_valid() {
            return Err(invalid(DescriptorKind::Device, Node::Device));
        }
        if let Some(s) = &self.string_zero {
            if !s.is_valid() {
                return Err(invalid(DescriptorKind::StringZero, Node::StringZero));
            }
        }
        if self.configurations.is_empty() {
            return Err(Error::NoConfigurations);
        }

        let manufacturer = self.manufacturer_strings.clone();
        let product = self.product_strings.clone();
        let serial_number = self.serial_number_strings.clone();
        self.device_derived.iManufacturer =
            self.device_strings(&manufacturer, MANUFACTURER_STRING_INDEX)?;
        self.device_derived.iProduct = self.device_strings(&product, PRODUCT_STRING_INDEX)?;
        self.device_derived.iSerialNumber =
            self.device_strings(&serial_number, SERIAL_NUMBER_STRING_INDEX)?;

        let mut indices = StringIndices {
            next: Some(USER_STRING_INDEX_BEGIN),
        };
        let configurations = self.configurations.clone();
        for (i, &id) in configurations.iter().enumerate() {
            let value = count(i + 1, Node::Configuration(id))?;
            self.number_configuration(id, value, &mut indices)?;
        }

        self.device_derived.bNumConfigurations = count(configurations.len(), Node::Device)?;
        Ok(())
    }

    /// Device strings use fixed indices, or 0 when absent.
    fn device_strings(&mut self, strings: &[StringId], index: u8) -> Result<u8, Error> {
        if strings.is_empty() {
            return Ok(0);
        }
        assign_strings(strings, &mut self.string_nodes, self.string_zero.as_ref(), index)?;
        Ok(index)
    }

    fn user_strings(
        &mut self,
        strings: &[StringId],
        owner: Node,
        indices: &mut StringIndices,
    ) -> Result<u8, Error> {
        if strings.is_empty() {
            return Ok(0);
        }
        let index = indices.take(owner)?;
        assign_strings(strings, &mut self.string_nodes, self.string_zero.as_ref(), index)?;
        Ok(index)
    }

    fn number_configuration(
        &mut self,
        id: ConfigurationId,
        value: u8,
        indices: &mut StringIndices,
    ) -> Result<(), Error> {
        let node = Node::Configuration(id);
        let configuration = self.configuration_node(id)?;
        if !configuration.record.is_valid() {
            return Err(invalid(DescriptorKind::Configuration, node));
        }
        if configuration.interfaces.is_empty() {
            return Err(Error::NoInterfaces(id));
        }
        let interfaces = configuration.interfaces.clone();
        let strings = configuration.strings.clone();

        let string_index = self.user_strings(&strings, node, indices)?;

        let mut total = Configuration::LEN;
        for (number, &interface) in interfaces.iter().enumerate() {
            let number = count(number, Node::Interface(interface))?;
            total += self.number_setting(interface.into(), number, 0, indices)?;

            let alternates = self.interface_node(interface)?.alternates.clone();
            for (i, &alternate) in alternates.iter().enumerate() {
                let setting = count(i + 1, Node::Alternate(alternate))?;
                total += self.number_setting(alternate.into(), number, setting, indices)?;
            }
        }

        let derived = ConfigurationDerived {
            wTotalLength: u16::try_from(total).map_err(|_| Error::Overflow(node))?,
            bNumInterfaces: count(interfaces.len(), node)?,
            bConfigurationValue: value,
            iConfiguration: string_index,
        };
        trace!(
            "configuration {}: value {}, {} interfaces, {} bytes",
            id,
            value,
            derived.bNumInterfaces,
            derived.wTotalLength
        );
        self.configuration_node_mut(id)?.derived = derived;
        Ok(())
    }

    /// Number an interface or alternate setting and return the length of its
    /// subtree.
    fn number_setting(
        &mut self,
        owner: EndpointOwner,
        number: u8,
        alternate_setting: u8,
        indices: &mut StringIndices,
    ) -> Result<usize, Error> {
        let node = Node::from(owner);
        let setting = self.setting(owner)?;
        if !setting.record.is_valid() {
            let kind = match owner {
                EndpointOwner::Interface(_) => DescriptorKind::Interface,
                EndpointOwner::Alternate(_) => DescriptorKind::AlternateInterface,
            };
            return Err(invalid(kind, node));
        }
        for &endpoint in &setting.endpoints {
            if !self.endpoint_node(endpoint)?.record.is_valid() {
                return Err(invalid(DescriptorKind::Endpoint, Node::Endpoint(endpoint)));
            }
        }
        let num_endpoints = count(setting.endpoints.len(), node)?;
        let strings = setting.strings.clone();

        let string_index = self.user_strings(&strings, node, indices)?;

        let len = Interface::LEN + num_endpoints as usize * Endpoint::LEN;
        let setting = self.setting_mut(owner)?;
        setting.derived = InterfaceDerived {
            bInterfaceNumber: number,
            bAlternateSetting: alternate_setting,
            bNumEndpoints: num_endpoints,
            iInterface: string_index,
        };
        // At most 9 + 255 * 7 bytes.
        setting.len = len as u16;
        trace!(
            "{}: interface {} setting {}, {} endpoints",
            owner,
            number,
            alternate_setting,
            num_endpoints
        );
        Ok(len)
    }
}
