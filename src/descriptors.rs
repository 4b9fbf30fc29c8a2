//! Descriptor records.
//!
//! Each record holds only the fields an integrator chooses. Fields that depend
//! on where the record sits in the tree (counts, numbering, string indices,
//! total lengths) live in the `*Derived` structs and are filled in by the
//! finalizer.

use alloc::vec::Vec;

use crate::codec::Writer;
use crate::Error;

/// Kind of a descriptor record.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DescriptorKind {
    Device,
    Configuration,
    Interface,
    AlternateInterface,
    Endpoint,
    String,
    StringZero,
}

const fn invalid(kind: DescriptorKind) -> Error {
    Error::InvalidDescriptor { kind, node: None }
}

/// String index of all manufacturer strings.
pub const MANUFACTURER_STRING_INDEX: u8 = 1;
/// String index of all product strings.
pub const PRODUCT_STRING_INDEX: u8 = 2;
/// String index of all serial number strings.
pub const SERIAL_NUMBER_STRING_INDEX: u8 = 3;
/// Strings attached to configurations and interfaces are numbered from here.
pub const USER_STRING_INDEX_BEGIN: u8 = 4;

/// Static fields of a USB device descriptor.
///
/// `iManufacturer`, `iProduct`, `iSerialNumber` and `bNumConfigurations` are
/// not set here, see [`DeviceDerived`].
#[allow(non_snake_case)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Device {
    pub bcdUSB: u16,
    pub bDeviceClass: u8,
    pub bDeviceSubClass: u8,
    pub bDeviceProtocol: u8,
    pub bMaxPacketSize0: u8,
    pub idVendor: u16,
    pub idProduct: u16,
    pub bcdDevice: u16,
}

#[allow(non_snake_case)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct DeviceDerived {
    pub iManufacturer: u8,
    pub iProduct: u8,
    pub iSerialNumber: u8,
    pub bNumConfigurations: u8,
}

impl Device {
    pub const LEN: usize = 18;
    pub const DESCRIPTOR_TYPE: u8 = usb::descriptor_type::DEVICE;

    pub fn new(fields: Device) -> Result<Self, Error> {
        if fields.is_valid() {
            Ok(fields)
        } else {
            Err(invalid(DescriptorKind::Device))
        }
    }

    /// Only the control endpoint sizes allowed below SuperSpeed are accepted.
    pub const fn is_valid(&self) -> bool {
        matches!(self.bMaxPacketSize0, 8 | 16 | 32 | 64)
    }

    pub(crate) fn encode(&self, w: &mut Writer, d: &DeviceDerived) -> Result<(), Error> {
        w.u8(Self::LEN as u8)?;
        w.u8(Self::DESCRIPTOR_TYPE)?;
        w.u16(self.bcdUSB)?;
        w.u8(self.bDeviceClass)?;
        w.u8(self.bDeviceSubClass)?;
        w.u8(self.bDeviceProtocol)?;
        w.u8(self.bMaxPacketSize0)?;
        w.u16(self.idVendor)?;
        w.u16(self.idProduct)?;
        w.u16(self.bcdDevice)?;
        w.u8(d.iManufacturer)?;
        w.u8(d.iProduct)?;
        w.u8(d.iSerialNumber)?;
        w.u8(d.bNumConfigurations)
    }
}

/// `bmAttributes` bits of a configuration descriptor.
pub mod configuration_attributes {
    /// Reserved, must always be set.
    pub const BUS_POWERED: u8 = 0x80;
    pub const SELF_POWERED: u8 = 0x40;
    pub const REMOTE_WAKEUP: u8 = 0x20;
    pub(crate) const RESERVED_ZERO_MASK: u8 = 0x1f;
}

/// Static fields of a USB configuration descriptor.
#[allow(non_snake_case)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Configuration {
    pub bmAttributes: u8,
    /// Maximum bus current in 2mA units.
    pub bMaxPower: u8,
}

#[allow(non_snake_case)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct ConfigurationDerived {
    pub wTotalLength: u16,
    pub bNumInterfaces: u8,
    pub bConfigurationValue: u8,
    pub iConfiguration: u8,
}

#[allow(non_snake_case)]
impl Configuration {
    pub const LEN: usize = 9;
    pub const DESCRIPTOR_TYPE: u8 = usb::descriptor_type::CONFIGURATION;

    pub fn new(bmAttributes: u8, bMaxPower: u8) -> Result<Self, Error> {
        let c = Configuration {
            bmAttributes,
            bMaxPower,
        };
        if c.is_valid() {
            Ok(c)
        } else {
            Err(invalid(DescriptorKind::Configuration))
        }
    }

    /// Convert a current in milliamps to `bMaxPower` units.
    pub const fn max_power_ma(milliamps: u16) -> u8 {
        let units = milliamps >> 1;
        if units > u8::MAX as u16 {
            u8::MAX
        } else {
            units as u8
        }
    }

    pub const fn is_valid(&self) -> bool {
        use configuration_attributes::{BUS_POWERED, RESERVED_ZERO_MASK};
        self.bmAttributes & BUS_POWERED != 0 && self.bmAttributes & RESERVED_ZERO_MASK == 0
    }

    pub(crate) fn encode(&self, w: &mut Writer, d: &ConfigurationDerived) -> Result<(), Error> {
        w.u8(Self::LEN as u8)?;
        w.u8(Self::DESCRIPTOR_TYPE)?;
        w.u16(d.wTotalLength)?;
        w.u8(d.bNumInterfaces)?;
        w.u8(d.bConfigurationValue)?;
        w.u8(d.iConfiguration)?;
        w.u8(self.bmAttributes)?;
        w.u8(self.bMaxPower)
    }
}

/// Static fields of a USB interface descriptor.
///
/// Used for both primary interfaces and their alternate settings. The
/// interface number, alternate setting, endpoint count and string index are
/// assigned from the tree, see [`InterfaceDerived`].
#[allow(non_snake_case)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Interface {
    pub bInterfaceClass: u8,
    pub bInterfaceSubClass: u8,
    pub bInterfaceProtocol: u8,
}

/// An alternate setting carries the same fields as its interface.
pub type AlternateInterface = Interface;

#[allow(non_snake_case)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct InterfaceDerived {
    pub bInterfaceNumber: u8,
    pub bAlternateSetting: u8,
    pub bNumEndpoints: u8,
    pub iInterface: u8,
}

#[allow(non_snake_case)]
impl Interface {
    pub const LEN: usize = 9;
    pub const DESCRIPTOR_TYPE: u8 = usb::descriptor_type::INTERFACE;

    pub fn new(
        bInterfaceClass: u8,
        bInterfaceSubClass: u8,
        bInterfaceProtocol: u8,
    ) -> Result<Self, Error> {
        let i = Interface {
            bInterfaceClass,
            bInterfaceSubClass,
            bInterfaceProtocol,
        };
        if i.is_valid() {
            Ok(i)
        } else {
            Err(invalid(DescriptorKind::Interface))
        }
    }

    /// Class, subclass and protocol are free-form codes.
    pub const fn is_valid(&self) -> bool {
        true
    }

    pub(crate) fn encode(&self, w: &mut Writer, d: &InterfaceDerived) -> Result<(), Error> {
        w.u8(Self::LEN as u8)?;
        w.u8(Self::DESCRIPTOR_TYPE)?;
        w.u8(d.bInterfaceNumber)?;
        w.u8(d.bAlternateSetting)?;
        w.u8(d.bNumEndpoints)?;
        w.u8(self.bInterfaceClass)?;
        w.u8(self.bInterfaceSubClass)?;
        w.u8(self.bInterfaceProtocol)?;
        w.u8(d.iInterface)
    }
}

/// `bEndpointAddress` and `bmAttributes` layout of an endpoint descriptor.
pub mod endpoint_bits {
    pub const NUMBER_MASK: u8 = 0x0f;
    pub const RESERVED_ADDRESS_MASK: u8 = 0x70;

    pub const TRANSFER_TYPE_MASK: u8 = 0b0000_0011;
    pub const SYNC_TYPE_MASK: u8 = 0b0000_1100;
    pub const USAGE_TYPE_MASK: u8 = 0b0011_0000;
    pub const RESERVED_ATTRIBUTES_MASK: u8 = 0b1100_0000;

    pub const CONTROL: u8 = 0b00;
    pub const ISOCHRONOUS: u8 = 0b01;
    pub const BULK: u8 = usb::endpoint_attributes::transfer_type::BULK;
    pub const INTERRUPT: u8 = 0b11;

    pub const SYNC_NONE: u8 = 0b00 << 2;
    pub const SYNC_ASYNCHRONOUS: u8 = 0b01 << 2;
    pub const SYNC_ADAPTIVE: u8 = 0b10 << 2;
    pub const SYNC_SYNCHRONOUS: u8 = 0b11 << 2;

    pub const USAGE_DATA: u8 = 0b00 << 4;
    pub const USAGE_FEEDBACK: u8 = 0b01 << 4;
    pub const USAGE_IMPLICIT_FEEDBACK: u8 = 0b10 << 4;
    pub(crate) const USAGE_RESERVED: u8 = 0b11 << 4;

    pub const MAX_PACKET_SIZE_MASK: u16 = 0x07ff;
    pub const ADDITIONAL_TRANSACTIONS_MASK: u16 = 0x1800;
    pub const RESERVED_MAX_PACKET_MASK: u16 = 0xe000;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

impl TransferType {
    pub const fn from_attributes(bm_attributes: u8) -> Self {
        use endpoint_bits::*;
        match bm_attributes & TRANSFER_TYPE_MASK {
            CONTROL => TransferType::Control,
            ISOCHRONOUS => TransferType::Isochronous,
            BULK => TransferType::Bulk,
            _ => TransferType::Interrupt,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Host to device
    Out,
    /// Device to host
    In,
}

/// Static fields of a USB endpoint descriptor.
#[allow(non_snake_case)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Endpoint {
    pub bEndpointAddress: u8,
    pub bmAttributes: u8,
    pub wMaxPacketSize: u16,
    pub bInterval: u8,

    /// Integrator-chosen number identifying the hardware endpoint that
    /// services this descriptor. Never sent to the host.
    pub hardware_id: u16,
}

#[allow(non_snake_case)]
impl Endpoint {
    pub const LEN: usize = 7;
    pub const DESCRIPTOR_TYPE: u8 = usb::descriptor_type::ENDPOINT;

    pub fn new(
        bEndpointAddress: u8,
        bmAttributes: u8,
        wMaxPacketSize: u16,
        bInterval: u8,
        hardware_id: u16,
    ) -> Result<Self, Error> {
        let ep = Endpoint {
            bEndpointAddress,
            bmAttributes,
            wMaxPacketSize,
            bInterval,
            hardware_id,
        };
        if ep.is_valid() {
            Ok(ep)
        } else {
            Err(invalid(DescriptorKind::Endpoint))
        }
    }

    pub fn bulk(
        bEndpointAddress: u8,
        wMaxPacketSize: u16,
        hardware_id: u16,
    ) -> Result<Self, Error> {
        Self::new(bEndpointAddress, endpoint_bits::BULK, wMaxPacketSize, 0, hardware_id)
    }

    pub fn interrupt(
        bEndpointAddress: u8,
        wMaxPacketSize: u16,
        bInterval: u8,
        hardware_id: u16,
    ) -> Result<Self, Error> {
        Self::new(
            bEndpointAddress,
            endpoint_bits::INTERRUPT,
            wMaxPacketSize,
            bInterval,
            hardware_id,
        )
    }

    pub const fn number(&self) -> u8 {
        self.bEndpointAddress & endpoint_bits::NUMBER_MASK
    }

    pub const fn direction(&self) -> Direction {
        if self.bEndpointAddress & usb::endpoint_address::DIR_MASK == usb::endpoint_address::IN {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub const fn transfer_type(&self) -> TransferType {
        TransferType::from_attributes(self.bmAttributes)
    }

    /// Packet size in bytes, without the additional transaction bits.
    pub const fn max_packet_size(&self) -> u16 {
        self.wMaxPacketSize & endpoint_bits::MAX_PACKET_SIZE_MASK
    }

    pub const fn is_valid(&self) -> bool {
        use endpoint_bits::*;

        if self.number() == 0 || self.bEndpointAddress & RESERVED_ADDRESS_MASK != 0 {
            return false;
        }
        if self.bmAttributes & RESERVED_ATTRIBUTES_MASK != 0 {
            return false;
        }
        if self.wMaxPacketSize & RESERVED_MAX_PACKET_MASK != 0 || self.max_packet_size() > 1024 {
            return false;
        }

        let sync = self.bmAttributes & SYNC_TYPE_MASK;
        let usage = self.bmAttributes & USAGE_TYPE_MASK;
        let additional = self.wMaxPacketSize & ADDITIONAL_TRANSACTIONS_MASK;

        match self.transfer_type() {
            TransferType::Control | TransferType::Bulk => {
                sync == SYNC_NONE && usage == USAGE_DATA && additional == 0
            }
            TransferType::Interrupt => {
                // Usage 0b01 is a SuperSpeed notification endpoint.
                sync == SYNC_NONE
                    && (usage == USAGE_DATA || usage == USAGE_FEEDBACK)
                    && additional != ADDITIONAL_TRANSACTIONS_MASK
                    && self.bInterval != 0
            }
            TransferType::Isochronous => {
                usage != USAGE_RESERVED
                    && additional != ADDITIONAL_TRANSACTIONS_MASK
                    && self.bInterval >= 1
                    && self.bInterval <= 16
            }
        }
    }

    pub(crate) fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        w.u8(Self::LEN as u8)?;
        w.u8(Self::DESCRIPTOR_TYPE)?;
        w.u8(self.bEndpointAddress)?;
        w.u8(self.bmAttributes)?;
        w.u16(self.wMaxPacketSize)?;
        w.u8(self.bInterval)
    }
}

/// Longest string that fits the one byte `bLength` field.
pub const MAX_STRING_UNITS: usize = (u8::MAX as usize - 2) / 2;

/// String descriptor zero: the list of supported language IDs.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StringZero {
    languages: Vec<u16>,
}

impl StringZero {
    pub const DESCRIPTOR_TYPE: u8 = usb::descriptor_type::STRING;

    pub fn new(languages: &[u16]) -> Result<Self, Error> {
        let s = StringZero {
            languages: languages.to_vec(),
        };
        if s.is_valid() {
            Ok(s)
        } else {
            Err(invalid(DescriptorKind::StringZero))
        }
    }

    pub fn english_us() -> Self {
        StringZero {
            languages: alloc::vec![usb::language_id::ENGLISH_US],
        }
    }

    pub fn languages(&self) -> &[u16] {
        &self.languages
    }

    pub fn language_count(&self) -> usize {
        self.languages.len()
    }

    pub fn has_language(&self, language: u16) -> bool {
        self.languages.contains(&language)
    }

    pub fn len(&self) -> usize {
        2 + self.languages.len() * 2
    }

    pub fn is_valid(&self) -> bool {
        !self.languages.is_empty() && self.languages.len() <= MAX_STRING_UNITS
    }

    pub(crate) fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        w.u8(self.len() as u8)?;
        w.u8(Self::DESCRIPTOR_TYPE)?;
        w.utf16(&self.languages)
    }
}

/// A string descriptor in one language.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StringDescriptor {
    language: u16,
    units: Vec<u16>,
}

impl StringDescriptor {
    pub const DESCRIPTOR_TYPE: u8 = usb::descriptor_type::STRING;

    pub fn new(s: &str, language: u16) -> Result<Self, Error> {
        Self::checked(s.encode_utf16().collect(), language)
    }

    pub fn from_utf16(units: &[u16], language: u16) -> Result<Self, Error> {
        Self::checked(units.to_vec(), language)
    }

    /// Uppercase hex rendering of `bytes`, as used for serial numbers.
    pub fn hex(bytes: &[u8], language: u16) -> Result<Self, Error> {
        fn hex(b: u8) -> u16 {
            b"0123456789ABCDEF"[b as usize] as u16
        }

        let units = bytes
            .iter()
            .flat_map(|&b| [hex(b >> 4), hex(b & 0x0f)])
            .collect();
        Self::checked(units, language)
    }

    fn checked(units: Vec<u16>, language: u16) -> Result<Self, Error> {
        let s = StringDescriptor { language, units };
        if s.is_valid() {
            Ok(s)
        } else {
            Err(invalid(DescriptorKind::String))
        }
    }

    pub fn language(&self) -> u16 {
        self.language
    }

    pub fn has_language(&self, language: u16) -> bool {
        self.language == language
    }

    pub fn units(&self) -> &[u16] {
        &self.units
    }

    pub fn char_count(&self) -> usize {
        self.units.len()
    }

    pub fn len(&self) -> usize {
        2 + self.units.len() * 2
    }

    pub fn is_valid(&self) -> bool {
        !self.units.is_empty() && self.units.len() <= MAX_STRING_UNITS
    }

    pub(crate) fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        w.u8(self.len() as u8)?;
        w.u8(Self::DESCRIPTOR_TYPE)?;
        w.utf16(&self.units)
    }
}
