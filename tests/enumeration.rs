use usbd_descriptors::codec::Reader;
use usbd_descriptors::descriptors::{
    configuration_attributes, Configuration, Device, Endpoint, Interface, StringDescriptor,
    StringZero,
};
use usbd_descriptors::{
    ConfigurationId, DescriptorTree, EndpointOwner, Error, InterfaceId, Node, StringOwner,
};

fn device(bcd: u16, vid: u16, pid: u16) -> Device {
    Device::new(Device {
        bcdUSB: bcd,
        bDeviceClass: 0,
        bDeviceSubClass: 0,
        bDeviceProtocol: 0,
        bMaxPacketSize0: 64,
        idVendor: vid,
        idProduct: pid,
        bcdDevice: bcd,
    })
    .unwrap()
}

fn bus_powered() -> Configuration {
    Configuration::new(
        configuration_attributes::BUS_POWERED,
        Configuration::max_power_ma(100),
    )
    .unwrap()
}

fn vendor_interface() -> Interface {
    Interface::new(0xff, 0x00, 0x00).unwrap()
}

/// Reads a device descriptor back into its fields.
fn decode_device(bytes: &[u8]) -> (Device, [u8; 4]) {
    let mut r = Reader::new(bytes);
    assert_eq!(r.u8(), Some(18));
    assert_eq!(r.u8(), Some(usb::descriptor_type::DEVICE));
    let d = Device {
        bcdUSB: r.u16().unwrap(),
        bDeviceClass: r.u8().unwrap(),
        bDeviceSubClass: r.u8().unwrap(),
        bDeviceProtocol: r.u8().unwrap(),
        bMaxPacketSize0: r.u8().unwrap(),
        idVendor: r.u16().unwrap(),
        idProduct: r.u16().unwrap(),
        bcdDevice: r.u16().unwrap(),
    };
    let strings_and_count = [r.u8().unwrap(), r.u8().unwrap(), r.u8().unwrap(), r.u8().unwrap()];
    assert!(r.remaining().is_empty());
    (d, strings_and_count)
}

/// One configuration, one interface, one IN and one OUT bulk endpoint.
fn bulk_pair() -> (DescriptorTree, ConfigurationId, InterfaceId) {
    let mut tree = DescriptorTree::new(device(0x0200, 0x1209, 0x0001), None).unwrap();
    let c = tree.insert_configuration(bus_powered()).unwrap();
    tree.attach_configuration(c).unwrap();
    let i = tree.insert_interface(vendor_interface()).unwrap();
    tree.attach_interface(c, i).unwrap();
    for (address, hw) in [(0x81, 1), (0x01, 2)] {
        let e = tree.insert_endpoint(Endpoint::bulk(address, 64, hw).unwrap()).unwrap();
        tree.attach_endpoint(i, e).unwrap();
    }
    (tree, c, i)
}

#[test]
fn bulk_pair_numbering() {
    let (mut tree, c, i) = bulk_pair();
    tree.finalize().unwrap();

    let config = tree.configuration_derived(c).unwrap();
    assert_eq!(config.bNumInterfaces, 1);
    assert_eq!(config.bConfigurationValue, 1);
    assert_eq!(
        config.wTotalLength as usize,
        Configuration::LEN + Interface::LEN + 2 * Endpoint::LEN
    );
    assert_eq!(tree.interface_derived(i).unwrap().bNumEndpoints, 2);
    assert_eq!(tree.subtree_len(Node::Configuration(c)), Ok(32));
}

#[test]
fn bulk_pair_bytes() {
    let (mut tree, c, _) = bulk_pair();
    tree.finalize().unwrap();

    let mut buf = [0u8; 64];
    let len = tree.serialize_subtree(Node::Configuration(c), &mut buf).unwrap();
    assert_eq!(
        &buf[..len],
        &[
            // configuration
            0x09, 0x02, 0x20, 0x00, 0x01, 0x01, 0x00, 0x80, 0x32,
            // interface
            0x09, 0x04, 0x00, 0x00, 0x02, 0xff, 0x00, 0x00, 0x00,
            // endpoints
            0x07, 0x05, 0x81, 0x02, 0x40, 0x00, 0x00,
            0x07, 0x05, 0x01, 0x02, 0x40, 0x00, 0x00,
        ]
    );
}

#[test]
fn serialized_length_matches_computed_length() {
    let zero = StringZero::english_us();
    let mut tree = DescriptorTree::new(device(0x0200, 0x1209, 0x0003), Some(zero)).unwrap();

    let mut nodes = vec![Node::Device, Node::StringZero];
    for _ in 0..2 {
        let c = tree.insert_configuration(bus_powered()).unwrap();
        tree.attach_configuration(c).unwrap();
        nodes.push(Node::Configuration(c));

        for n in 0..3u8 {
            let i = tree.insert_interface(vendor_interface()).unwrap();
            tree.attach_interface(c, i).unwrap();
            nodes.push(Node::Interface(i));

            let e = tree
                .insert_endpoint(Endpoint::interrupt(0x81 + n, 8, 1, n.into()).unwrap())
                .unwrap();
            tree.attach_endpoint(i, e).unwrap();
            nodes.push(Node::Endpoint(e));

            for k in 0..n {
                let a = tree.insert_alternate(vendor_interface()).unwrap();
                tree.attach_alternate(i, a).unwrap();
                nodes.push(Node::Alternate(a));
                let e = tree.insert_endpoint(Endpoint::bulk(0x01 + k, 64, 0).unwrap()).unwrap();
                tree.attach_endpoint(a, e).unwrap();
            }
        }

        let s = tree.insert_string(StringDescriptor::new("Mode", 0x0409).unwrap()).unwrap();
        tree.attach_string(c, s).unwrap();
        nodes.push(Node::String(s));
    }
    tree.finalize().unwrap();

    let mut buf = [0u8; 256];
    for node in nodes {
        let expected = tree.subtree_len(node).unwrap();
        assert_eq!(tree.serialize_subtree(node, &mut buf), Ok(expected), "{node:?}");
    }
}

#[test]
fn configurations_interfaces_and_alternates_are_sequential() {
    let mut tree = DescriptorTree::new(device(0x0200, 0x1209, 0x0004), None).unwrap();
    let mut configs = Vec::new();
    let mut interfaces = Vec::new();
    let mut alternates = Vec::new();

    for _ in 0..3 {
        let c = tree.insert_configuration(bus_powered()).unwrap();
        tree.attach_configuration(c).unwrap();
        configs.push(c);
        for _ in 0..4 {
            let i = tree.insert_interface(vendor_interface()).unwrap();
            tree.attach_interface(c, i).unwrap();
            interfaces.push(i);
        }
    }
    let last = *interfaces.last().unwrap();
    for _ in 0..3 {
        let a = tree.insert_alternate(vendor_interface()).unwrap();
        tree.attach_alternate(last, a).unwrap();
        alternates.push(a);
    }
    tree.finalize().unwrap();

    for (n, &c) in configs.iter().enumerate() {
        assert_eq!(tree.configuration_derived(c).unwrap().bConfigurationValue as usize, n + 1);
        for (m, &i) in tree.interfaces(c).unwrap().iter().enumerate() {
            assert_eq!(tree.interface_derived(i).unwrap().bInterfaceNumber as usize, m);
        }
    }

    assert_eq!(tree.interface_derived(last).unwrap().bAlternateSetting, 0);
    for (k, &a) in alternates.iter().enumerate() {
        let derived = tree.interface_derived(a).unwrap();
        assert_eq!(derived.bInterfaceNumber, 3);
        assert_eq!(derived.bAlternateSetting as usize, k + 1);
    }
    assert_eq!(tree.alternates(last).unwrap(), &alternates[..]);
}

#[test]
fn endpoint_ownership() {
    let mut tree = DescriptorTree::new(device(0x0200, 0x1209, 0x0005), None).unwrap();
    let c = tree.insert_configuration(bus_powered()).unwrap();
    let i0 = tree.insert_interface(vendor_interface()).unwrap();
    let i1 = tree.insert_interface(vendor_interface()).unwrap();
    tree.attach_interface(c, i0).unwrap();
    tree.attach_interface(c, i1).unwrap();

    let shared = tree.insert_endpoint(Endpoint::bulk(0x81, 64, 0).unwrap()).unwrap();
    tree.attach_endpoint(i0, shared).unwrap();
    assert_eq!(tree.attach_endpoint(i1, shared), Err(Error::AlreadyOwned(Node::Endpoint(shared))));
    assert!(tree.endpoints(i1).unwrap().is_empty());

    let same_address = tree.insert_endpoint(Endpoint::bulk(0x81, 32, 1).unwrap()).unwrap();
    assert_eq!(
        tree.attach_endpoint(i0, same_address),
        Err(Error::DuplicateEndpointAddress { address: 0x81 })
    );
    tree.attach_endpoint(i1, same_address).unwrap();

    // Direction is part of the address.
    let out = tree.insert_endpoint(Endpoint::bulk(0x01, 64, 2).unwrap()).unwrap();
    tree.attach_endpoint(i0, out).unwrap();
    assert_eq!(tree.endpoints(EndpointOwner::Interface(i0)).unwrap(), &[shared, out]);
}

#[test]
fn other_nodes_are_owned_once() {
    let zero = StringZero::english_us();
    let mut tree = DescriptorTree::new(device(0x0200, 0x1209, 0x0006), Some(zero)).unwrap();
    let c1 = tree.insert_configuration(bus_powered()).unwrap();
    let c2 = tree.insert_configuration(bus_powered()).unwrap();
    tree.attach_configuration(c1).unwrap();
    assert_eq!(tree.attach_configuration(c1), Err(Error::AlreadyOwned(Node::Configuration(c1))));

    let i = tree.insert_interface(vendor_interface()).unwrap();
    tree.attach_interface(c1, i).unwrap();
    assert_eq!(tree.attach_interface(c2, i), Err(Error::AlreadyOwned(Node::Interface(i))));

    let a = tree.insert_alternate(vendor_interface()).unwrap();
    tree.attach_alternate(i, a).unwrap();
    assert_eq!(tree.attach_alternate(i, a), Err(Error::AlreadyOwned(Node::Alternate(a))));

    let s = tree.insert_string(StringDescriptor::new("One", 0x0409).unwrap()).unwrap();
    tree.attach_string(StringOwner::Product, s).unwrap();
    assert_eq!(tree.attach_string(a, s), Err(Error::AlreadyOwned(Node::String(s))));

    let again = tree.insert_string(StringDescriptor::new("Two", 0x0409).unwrap()).unwrap();
    assert_eq!(
        tree.attach_string(StringOwner::Product, again),
        Err(Error::DuplicateLanguage { language: 0x0409 })
    );
}

#[test]
fn missing_string_zero_is_reported_by_finalize() {
    let mut tree = DescriptorTree::new(device(0x0200, 0x1209, 0x0007), None).unwrap();
    let c = tree.insert_configuration(bus_powered()).unwrap();
    tree.attach_configuration(c).unwrap();
    let i = tree.insert_interface(vendor_interface()).unwrap();
    tree.attach_interface(c, i).unwrap();

    let s = tree.insert_string(StringDescriptor::new("Data", 0x0409).unwrap()).unwrap();
    assert_eq!(tree.attach_string(i, s), Ok(()));
    assert_eq!(tree.finalize(), Err(Error::MissingStringZero));

    let mut buf = [0u8; 64];
    assert_eq!(tree.serialize_subtree(Node::Device, &mut buf), Err(Error::NotFinalized));
}

#[test]
fn lifecycle() {
    let (mut tree, c, i) = bulk_pair();
    let mut buf = [0x55u8; 31];

    assert_eq!(tree.serialize_subtree(Node::Configuration(c), &mut buf), Err(Error::NotFinalized));

    tree.finalize().unwrap();
    assert_eq!(tree.finalize(), Err(Error::AlreadyFinalized));

    let e = Endpoint::bulk(0x82, 64, 3).unwrap();
    assert_eq!(tree.insert_endpoint(e), Err(Error::AlreadyFinalized));
    assert_eq!(tree.attach_configuration(c), Err(Error::AlreadyFinalized));
    assert_eq!(tree.interface_derived(i).unwrap().bNumEndpoints, 2);

    assert_eq!(
        tree.serialize_subtree(Node::Configuration(c), &mut buf),
        Err(Error::BufferTooSmall { needed: 32, available: 31 })
    );
    assert_eq!(buf, [0x55; 31]);
}

#[test]
fn device_fields_round_trip() {
    for value in [0x0000, 0xffff, 0x0102] {
        let zero = StringZero::english_us();
        let mut tree = DescriptorTree::new(device(value, value, value), Some(zero)).unwrap();
        let c = tree.insert_configuration(bus_powered()).unwrap();
        tree.attach_configuration(c).unwrap();
        let i = tree.insert_interface(vendor_interface()).unwrap();
        tree.attach_interface(c, i).unwrap();
        let serial = StringDescriptor::hex(&[0x12, 0x34], 0x0409).unwrap();
        let serial = tree.insert_string(serial).unwrap();
        tree.attach_string(StringOwner::SerialNumber, serial).unwrap();
        tree.finalize().unwrap();

        let mut buf = [0u8; Device::LEN];
        assert_eq!(tree.serialize_subtree(Node::Device, &mut buf), Ok(Device::LEN));
        let (decoded, derived) = decode_device(&buf);
        assert_eq!(decoded, *tree.device());
        assert_eq!(derived, [0, 0, 3, 1]);
    }
}

#[test]
fn answers_get_descriptor() {
    let zero = StringZero::english_us();
    let mut tree = DescriptorTree::new(device(0x0200, 0x1209, 0x0008), Some(zero)).unwrap();
    let c = tree.insert_configuration(bus_powered()).unwrap();
    tree.attach_configuration(c).unwrap();
    let i = tree.insert_interface(vendor_interface()).unwrap();
    tree.attach_interface(c, i).unwrap();
    let s = tree.insert_string(StringDescriptor::new("ACME", 0x0409).unwrap()).unwrap();
    tree.attach_string(StringOwner::Manufacturer, s).unwrap();
    tree.finalize().unwrap();

    let mut buf = [0u8; 64];
    let node = tree.lookup(usb::descriptor_type::STRING, 1, 0x0409).unwrap();
    let len = tree.serialize_subtree(node, &mut buf).unwrap();
    assert_eq!(&buf[..len], &[10, 3, b'A', 0, b'C', 0, b'M', 0, b'E', 0]);

    let node = tree.lookup(usb::descriptor_type::STRING, 0, 0).unwrap();
    let len = tree.serialize_subtree(node, &mut buf).unwrap();
    assert_eq!(&buf[..len], &[4, 3, 0x09, 0x04]);
}
