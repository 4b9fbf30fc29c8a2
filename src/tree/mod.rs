//! Ownership tree connecting descriptor records.
//!
//! Records live in per-kind arenas and are referred to by small typed
//! handles. Each parent keeps the ordered list of its children's handles, and
//! each child remembers its parent so a second attach can be refused.
//! Attachment order is the order the finalizer numbers things in.

use alloc::vec::Vec;

use crate::descriptors::{
    Configuration, ConfigurationDerived, DescriptorKind, Device, DeviceDerived, Endpoint,
    Interface, InterfaceDerived, StringDescriptor, StringZero,
};
use crate::Error;

mod finalize;
mod lookup;
mod serialize;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub struct $name(u16);

        impl $name {
            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

handle!(
    /// Handle to a configuration inserted with [`DescriptorTree::insert_configuration`].
    ConfigurationId
);
handle!(
    /// Handle to an interface inserted with [`DescriptorTree::insert_interface`].
    InterfaceId
);
handle!(
    /// Handle to an alternate setting inserted with [`DescriptorTree::insert_alternate`].
    AlternateId
);
handle!(
    /// Handle to an endpoint inserted with [`DescriptorTree::insert_endpoint`].
    EndpointId
);
handle!(
    /// Handle to a string inserted with [`DescriptorTree::insert_string`].
    StringId
);

/// Any node of the tree.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Node {
    Device,
    StringZero,
    Configuration(ConfigurationId),
    Interface(InterfaceId),
    Alternate(AlternateId),
    Endpoint(EndpointId),
    String(StringId),
}

/// Nodes that may own endpoints.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndpointOwner {
    Interface(InterfaceId),
    Alternate(AlternateId),
}

/// Nodes that may own strings.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StringOwner {
    Manufacturer,
    Product,
    SerialNumber,
    Configuration(ConfigurationId),
    Interface(InterfaceId),
    Alternate(AlternateId),
}

impl From<InterfaceId> for EndpointOwner {
    fn from(id: InterfaceId) -> Self {
        EndpointOwner::Interface(id)
    }
}

impl From<AlternateId> for EndpointOwner {
    fn from(id: AlternateId) -> Self {
        EndpointOwner::Alternate(id)
    }
}

impl From<ConfigurationId> for StringOwner {
    fn from(id: ConfigurationId) -> Self {
        StringOwner::Configuration(id)
    }
}

impl From<InterfaceId> for StringOwner {
    fn from(id: InterfaceId) -> Self {
        StringOwner::Interface(id)
    }
}

impl From<AlternateId> for StringOwner {
    fn from(id: AlternateId) -> Self {
        StringOwner::Alternate(id)
    }
}

impl From<EndpointOwner> for Node {
    fn from(owner: EndpointOwner) -> Self {
        match owner {
            EndpointOwner::Interface(id) => Node::Interface(id),
            EndpointOwner::Alternate(id) => Node::Alternate(id),
        }
    }
}

impl From<ConfigurationId> for Node {
    fn from(id: ConfigurationId) -> Self {
        Node::Configuration(id)
    }
}

impl From<InterfaceId> for Node {
    fn from(id: InterfaceId) -> Self {
        Node::Interface(id)
    }
}

impl From<AlternateId> for Node {
    fn from(id: AlternateId) -> Self {
        Node::Alternate(id)
    }
}

impl From<EndpointId> for Node {
    fn from(id: EndpointId) -> Self {
        Node::Endpoint(id)
    }
}

impl From<StringId> for Node {
    fn from(id: StringId) -> Self {
        Node::String(id)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    Setup,
    Finalizing,
    Finalized,
    Failed,
}

struct ConfigurationNode {
    record: Configuration,
    attached: bool,
    interfaces: Vec<InterfaceId>,
    strings: Vec<StringId>,
    derived: ConfigurationDerived,
}

/// The part shared by an interface and its alternate settings.
struct Setting {
    record: Interface,
    endpoints: Vec<EndpointId>,
    strings: Vec<StringId>,
    derived: InterfaceDerived,
    /// Interface descriptor plus its endpoints, set by the finalizer.
    len: u16,
}

impl Setting {
    fn new(record: Interface) -> Self {
        Setting {
            record,
            endpoints: Vec::new(),
            strings: Vec::new(),
            derived: InterfaceDerived::default(),
            len: 0,
        }
    }
}

struct InterfaceNode {
    setting: Setting,
    parent: Option<ConfigurationId>,
    alternates: Vec<AlternateId>,
}

struct AlternateNode {
    setting: Setting,
    parent: Option<InterfaceId>,
}

struct EndpointNode {
    record: Endpoint,
    parent: Option<EndpointOwner>,
}

struct StringNode {
    record: StringDescriptor,
    parent: Option<StringOwner>,
    index: u8,
}

/// Descriptor tree of one USB device.
///
/// Built during setup with the `insert_*` and `attach_*` methods, then frozen
/// by [`finalize`](Self::finalize). After that the tree is read-only and can
/// be shared between any number of readers.
pub struct DescriptorTree {
    device: Device,
    device_derived: DeviceDerived,
    string_zero: Option<StringZero>,

    configurations: Vec<ConfigurationId>,
    manufacturer_strings: Vec<StringId>,
    product_strings: Vec<StringId>,
    serial_number_strings: Vec<StringId>,

    configuration_nodes: Vec<ConfigurationNode>,
    interface_nodes: Vec<InterfaceNode>,
    alternate_nodes: Vec<AlternateNode>,
    endpoint_nodes: Vec<EndpointNode>,
    string_nodes: Vec<StringNode>,

    state: State,
}

fn next_handle<T>(arena: &[T], node: fn(u16) -> Node) -> Result<u16, Error> {
    u16::try_from(arena.len()).map_err(|_| Error::Overflow(node(u16::MAX)))
}

impl DescriptorTree {
    /// Start a tree for `device`.
    ///
    /// `string_zero` lists the supported languages. Without it no strings can
    /// be used anywhere in the tree.
    pub fn new(device: Device, string_zero: Option<StringZero>) -> Result<Self, Error> {
        if !device.is_valid() {
            return Err(Error::InvalidDescriptor {
                kind: DescriptorKind::Device,
                node: Some(Node::Device),
            });
        }
        if let Some(s) = &string_zero {
            if !s.is_valid() {
                return Err(Error::InvalidDescriptor {
                    kind: DescriptorKind::StringZero,
                    node: Some(Node::StringZero),
                });
            }
        }

        Ok(DescriptorTree {
            device,
            device_derived: DeviceDerived::default(),
            string_zero,
            configurations: Vec::new(),
            manufacturer_strings: Vec::new(),
            product_strings: Vec::new(),
            serial_number_strings: Vec::new(),
            configuration_nodes: Vec::new(),
            interface_nodes: Vec::new(),
            alternate_nodes: Vec::new(),
            endpoint_nodes: Vec::new(),
            string_nodes: Vec::new(),
            state: State::Setup,
        })
    }

    fn check_setup(&self) -> Result<(), Error> {
        match self.state {
            State::Setup => Ok(()),
            _ => Err(Error::AlreadyFinalized),
        }
    }

    fn check_finalized(&self) -> Result<(), Error> {
        match self.state {
            State::Finalized => Ok(()),
            _ => Err(Error::NotFinalized),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.state == State::Finalized
    }

    pub fn insert_configuration(
        &mut self,
        record: Configuration,
    ) -> Result<ConfigurationId, Error> {
        self.check_setup()?;
        let id = ConfigurationId(next_handle(&self.configuration_nodes, |i| {
            Node::Configuration(ConfigurationId(i))
        })?);
        self.configuration_nodes.push(ConfigurationNode {
            record,
            attached: false,
            interfaces: Vec::new(),
            strings: Vec::new(),
            derived: ConfigurationDerived::default(),
        });
        Ok(id)
    }

    pub fn insert_interface(&mut self, record: Interface) -> Result<InterfaceId, Error> {
        self.check_setup()?;
        let id = InterfaceId(next_handle(&self.interface_nodes, |i| {
            Node::Interface(InterfaceId(i))
        })?);
        self.interface_nodes.push(InterfaceNode {
            setting: Setting::new(record),
            parent: None,
            alternates: Vec::new(),
        });
        Ok(id)
    }

    pub fn insert_alternate(&mut self, record: Interface) -> Result<AlternateId, Error> {
        self.check_setup()?;
        let id = AlternateId(next_handle(&self.alternate_nodes, |i| {
            Node::Alternate(AlternateId(i))
        })?);
        self.alternate_nodes.push(AlternateNode {
            setting: Setting::new(record),
            parent: None,
        });
        Ok(id)
    }

    pub fn insert_endpoint(&mut self, record: Endpoint) -> Result<EndpointId, Error> {
        self.check_setup()?;
        let id = EndpointId(next_handle(&self.endpoint_nodes, |i| Node::Endpoint(EndpointId(i)))?);
        self.endpoint_nodes.push(EndpointNode { record, parent: None });
        Ok(id)
    }

    pub fn insert_string(&mut self, record: StringDescriptor) -> Result<StringId, Error> {
        self.check_setup()?;
        let id = StringId(next_handle(&self.string_nodes, |i| Node::String(StringId(i)))?);
        self.string_nodes.push(StringNode {
            record,
            parent: None,
            index: 0,
        });
        Ok(id)
    }

    pub fn attach_configuration(&mut self, configuration: ConfigurationId) -> Result<(), Error> {
        self.check_setup()?;
        let node = self.configuration_node_mut(configuration)?;
        if node.attached {
            return Err(Error::AlreadyOwned(Node::Configuration(configuration)));
        }
        node.attached = true;
        self.configurations.push(configuration);
        debug!("attached configuration {} to device", configuration);
        Ok(())
    }

    pub fn attach_interface(
        &mut self,
        configuration: ConfigurationId,
        interface: InterfaceId,
    ) -> Result<(), Error> {
        self.check_setup()?;
        self.configuration_node(configuration)?;
        let node = self.interface_node_mut(interface)?;
        if node.parent.is_some() {
            return Err(Error::AlreadyOwned(Node::Interface(interface)));
        }
        node.parent = Some(configuration);
        self.configuration_node_mut(configuration)?.interfaces.push(interface);
        debug!("attached interface {} to configuration {}", interface, configuration);
        Ok(())
    }

    pub fn attach_alternate(
        &mut self,
        interface: InterfaceId,
        alternate: AlternateId,
    ) -> Result<(), Error> {
        self.check_setup()?;
        self.interface_node(interface)?;
        let node = self.alternate_node_mut(alternate)?;
        if node.parent.is_some() {
            return Err(Error::AlreadyOwned(Node::Alternate(alternate)));
        }
        node.parent = Some(interface);
        self.interface_node_mut(interface)?.alternates.push(alternate);
        debug!("attached alternate {} to interface {}", alternate, interface);
        Ok(())
    }

    pub fn attach_endpoint(
        &mut self,
        owner: impl Into<EndpointOwner>,
        endpoint: EndpointId,
    ) -> Result<(), Error> {
        self.check_setup()?;
        let owner = owner.into();
        let address = self.endpoint_node(endpoint)?.record.bEndpointAddress;

        let siblings = &self.setting(owner)?.endpoints;
        if self.endpoint_node(endpoint)?.parent.is_some() {
            return Err(Error::AlreadyOwned(Node::Endpoint(endpoint)));
        }
        if siblings
            .iter()
            .any(|&e| self.endpoint_nodes[e.index()].record.bEndpointAddress == address)
        {
            return Err(Error::DuplicateEndpointAddress { address });
        }

        self.endpoint_node_mut(endpoint)?.parent = Some(owner);
        self.setting_mut(owner)?.endpoints.push(endpoint);
        debug!("attached endpoint {} ({}) to {}", endpoint, address, owner);
        Ok(())
    }

    /// Attach a string to one of the device's string collections, or to a
    /// configuration, interface or alternate setting.
    ///
    /// All strings under one owner share one string index and must each be
    /// in a different language. Whether the language is supported is only
    /// checked by [`finalize`](Self::finalize).
    pub fn attach_string(
        &mut self,
        owner: impl Into<StringOwner>,
        string: StringId,
    ) -> Result<(), Error> {
        self.check_setup()?;
        let owner = owner.into();
        let language = self.string_node(string)?.record.language();

        let siblings = self.strings_of(owner)?;
        if self.string_node(string)?.parent.is_some() {
            return Err(Error::AlreadyOwned(Node::String(string)));
        }
        if siblings
            .iter()
            .any(|&s| self.string_nodes[s.index()].record.has_language(language))
        {
            return Err(Error::DuplicateLanguage { language });
        }

        self.string_node_mut(string)?.parent = Some(owner);
        self.strings_of_mut(owner)?.push(string);
        debug!("attached string {} to {}", string, owner);
        Ok(())
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Zero until the tree is finalized.
    pub fn device_derived(&self) -> &DeviceDerived {
        &self.device_derived
    }

    pub fn string_zero(&self) -> Option<&StringZero> {
        self.string_zero.as_ref()
    }

    /// Configurations attached to the device, in attachment order.
    pub fn configurations(&self) -> &[ConfigurationId] {
        &self.configurations
    }

    pub fn configuration(&self, id: ConfigurationId) -> Option<&Configuration> {
        self.configuration_nodes.get(id.index()).map(|n| &n.record)
    }

    pub fn configuration_derived(&self, id: ConfigurationId) -> Option<&ConfigurationDerived> {
        self.configuration_nodes.get(id.index()).map(|n| &n.derived)
    }

    pub fn interfaces(&self, id: ConfigurationId) -> Option<&[InterfaceId]> {
        self.configuration_nodes.get(id.index()).map(|n| &n.interfaces[..])
    }

    pub fn interface(&self, id: InterfaceId) -> Option<&Interface> {
        self.interface_nodes.get(id.index()).map(|n| &n.setting.record)
    }

    pub fn alternates(&self, id: InterfaceId) -> Option<&[AlternateId]> {
        self.interface_nodes.get(id.index()).map(|n| &n.alternates[..])
    }

    pub fn alternate(&self, id: AlternateId) -> Option<&Interface> {
        self.alternate_nodes.get(id.index()).map(|n| &n.setting.record)
    }

    /// Numbering of an interface or alternate setting.
    pub fn interface_derived(&self, owner: impl Into<EndpointOwner>) -> Option<&InterfaceDerived> {
        self.setting(owner.into()).ok().map(|s| &s.derived)
    }

    pub fn endpoints(&self, owner: impl Into<EndpointOwner>) -> Option<&[EndpointId]> {
        self.setting(owner.into()).ok().map(|s| &s.endpoints[..])
    }

    pub fn endpoint(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoint_nodes.get(id.index()).map(|n| &n.record)
    }

    pub fn strings(&self, owner: impl Into<StringOwner>) -> Option<&[StringId]> {
        self.strings_of(owner.into()).ok()
    }

    pub fn string(&self, id: StringId) -> Option<&StringDescriptor> {
        self.string_nodes.get(id.index()).map(|n| &n.record)
    }

    /// String index assigned by the finalizer, 0 before that.
    pub fn string_index(&self, id: StringId) -> Option<u8> {
        self.string_nodes.get(id.index()).map(|n| n.index)
    }

    /// Whether `node` is reachable from the device.
    pub fn contains(&self, node: Node) -> bool {
        match node {
            Node::Device => true,
            Node::StringZero => self.string_zero.is_some(),
            Node::Configuration(id) => {
                self.configuration_nodes.get(id.index()).is_some_and(|n| n.attached)
            }
            Node::Interface(id) => self
                .interface_nodes
                .get(id.index())
                .and_then(|n| n.parent)
                .is_some_and(|c| self.contains(Node::Configuration(c))),
            Node::Alternate(id) => self
                .alternate_nodes
                .get(id.index())
                .and_then(|n| n.parent)
                .is_some_and(|i| self.contains(Node::Interface(i))),
            Node::Endpoint(id) => self
                .endpoint_nodes
                .get(id.index())
                .and_then(|n| n.parent)
                .is_some_and(|owner| self.contains(owner.into())),
            Node::String(id) => match self.string_nodes.get(id.index()).and_then(|n| n.parent) {
                None => false,
                Some(
                    StringOwner::Manufacturer | StringOwner::Product | StringOwner::SerialNumber,
                ) => true,
                Some(StringOwner::Configuration(c)) => self.contains(Node::Configuration(c)),
                Some(StringOwner::Interface(i)) => self.contains(Node::Interface(i)),
                Some(StringOwner::Alternate(a)) => self.contains(Node::Alternate(a)),
            },
        }
    }

    fn configuration_node(&self, id: ConfigurationId) -> Result<&ConfigurationNode, Error> {
        self.configuration_nodes
            .get(id.index())
            .ok_or(Error::UnknownNode(Node::Configuration(id)))
    }

    fn configuration_node_mut(
        &mut self,
        id: ConfigurationId,
    ) -> Result<&mut ConfigurationNode, Error> {
        self.configuration_nodes
            .get_mut(id.index())
            .ok_or(Error::UnknownNode(Node::Configuration(id)))
    }

    fn interface_node(&self, id: InterfaceId) -> Result<&InterfaceNode, Error> {
        self.interface_nodes
            .get(id.index())
            .ok_or(Error::UnknownNode(Node::Interface(id)))
    }

    fn interface_node_mut(&mut self, id: InterfaceId) -> Result<&mut InterfaceNode, Error> {
        self.interface_nodes
            .get_mut(id.index())
            .ok_or(Error::UnknownNode(Node::Interface(id)))
    }

    fn alternate_node_mut(&mut self, id: AlternateId) -> Result<&mut AlternateNode, Error> {
        self.alternate_nodes
            .get_mut(id.index())
            .ok_or(Error::UnknownNode(Node::Alternate(id)))
    }

    fn endpoint_node(&self, id: EndpointId) -> Result<&EndpointNode, Error> {
        self.endpoint_nodes
            .get(id.index())
            .ok_or(Error::UnknownNode(Node::Endpoint(id)))
    }

    fn endpoint_node_mut(&mut self, id: EndpointId) -> Result<&mut EndpointNode, Error> {
        self.endpoint_nodes
            .get_mut(id.index())
            .ok_or(Error::UnknownNode(Node::Endpoint(id)))
    }

    fn string_node(&self, id: StringId) -> Result<&StringNode, Error> {
        self.string_nodes
            .get(id.index())
            .ok_or(Error::UnknownNode(Node::String(id)))
    }

    fn string_node_mut(&mut self, id: StringId) -> Result<&mut StringNode, Error> {
        self.string_nodes
            .get_mut(id.index())
            .ok_or(Error::UnknownNode(Node::String(id)))
    }

    fn setting(&self, owner: EndpointOwner) -> Result<&Setting, Error> {
        match owner {
            EndpointOwner::Interface(id) => self.interface_node(id).map(|n| &n.setting),
            EndpointOwner::Alternate(id) => self
                .alternate_nodes
                .get(id.index())
                .map(|n| &n.setting)
                .ok_or(Error::UnknownNode(Node::Alternate(id))),
        }
    }

    fn setting_mut(&mut self, owner: EndpointOwner) -> Result<&mut Setting, Error> {
        match owner {
            EndpointOwner::Interface(id) => self.interface_node_mut(id).map(|n| &mut n.setting),
            EndpointOwner::Alternate(id) => self.alternate_node_mut(id).map(|n| &mut n.setting),
        }
    }

    fn strings_of(&self, owner: StringOwner) -> Result<&[StringId], Error> {
        let strings = match owner {
            StringOwner::Manufacturer => &self.manufacturer_strings,
            StringOwner::Product => &self.product_strings,
            StringOwner::SerialNumber => &self.serial_number_strings,
            StringOwner::Configuration(id) => &self.configuration_node(id)?.strings,
            StringOwner::Interface(id) => &self.setting(id.into())?.strings,
            StringOwner::Alternate(id) => &self.setting(id.into())?.strings,
        };
        Ok(strings.as_slice())
    }

    fn strings_of_mut(&mut self, owner: StringOwner) -> Result<&mut Vec<StringId>, Error> {
        Ok(match owner {
            StringOwner::Manufacturer => &mut self.manufacturer_strings,
            StringOwner::Product => &mut self.product_strings,
            StringOwner::SerialNumber => &mut self.serial_number_strings,
            StringOwner::Configuration(id) => &mut self.configuration_node_mut(id)?.strings,
            StringOwner::Interface(id) => &mut self.setting_mut(id.into())?.strings,
            StringOwner::Alternate(id) => &mut self.setting_mut(id.into())?.strings,
        })
    }
}
