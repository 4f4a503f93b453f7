#[cfg(test)]
mod base_tests {
    use crate::variable_versions::record::{self, RecordContext};
    use crate::{
        FieldDictionary, FieldValue, NetflowDecoder, RawField, TemplateAck, TemplateKey,
        TemplateRegistry, VARIABLE_LENGTH,
    };

    use std::net::Ipv4Addr;
    use std::thread;
    use std::time::Duration;

    /// Big-endian packet builder for test fixtures.
    #[derive(Default)]
    struct Wire(Vec<u8>);

    impl Wire {
        fn u8(mut self, v: u8) -> Self {
            self.0.push(v);
            self
        }
        fn u16(mut self, v: u16) -> Self {
            self.0.extend_from_slice(&v.to_be_bytes());
            self
        }
        fn u32(mut self, v: u32) -> Self {
            self.0.extend_from_slice(&v.to_be_bytes());
            self
        }
        fn u64(mut self, v: u64) -> Self {
            self.0.extend_from_slice(&v.to_be_bytes());
            self
        }
        fn bytes(mut self, v: &[u8]) -> Self {
            self.0.extend_from_slice(v);
            self
        }
        fn build(self) -> Vec<u8> {
            self.0
        }
    }

    fn decoder() -> NetflowDecoder {
        NetflowDecoder::builder().build().expect("default dictionaries load")
    }

    fn collect(decoder: &NetflowDecoder, datagram: &[u8], host: &str) -> Vec<crate::FlowEvent> {
        let mut events = Vec::new();
        decoder.decode(datagram, Some(host), |_ts, event| events.push(event));
        events
    }

    /// 24-byte v5 header followed by `records`.
    fn v5_packet(count: u16, records: &[u8]) -> Vec<u8> {
        Wire::default()
            .u16(5)
            .u16(count)
            .u32(1_000_000) // sys_up_time
            .u32(1_700_000_000) // unix_secs
            .u32(0) // unix_nsecs
            .u32(1) // flow_sequence
            .u8(0x01) // engine_type
            .u8(0x02) // engine_id
            .u16(0x4003) // sampling: algorithm 1, interval 3
            .bytes(records)
            .build()
    }

    fn v5_record() -> Vec<u8> {
        Wire::default()
            .u32(0x0102_0304) // src 1.2.3.4
            .u32(0x0506_0708) // dst 5.6.7.8
            .u32(0) // next hop
            .u16(10) // input
            .u16(20) // output
            .u32(100) // d_pkts
            .u32(4_000) // d_octets
            .u32(995_000) // first: uptime - 5000ms
            .u32(999_000) // last: uptime - 1000ms
            .u16(80)
            .u16(443)
            .u8(0) // pad1
            .u8(0x1b) // tcp_flags
            .u8(6) // protocol
            .u8(0) // tos
            .u16(64500)
            .u16(64501)
            .u8(24)
            .u8(16)
            .u16(0) // pad2
            .build()
    }

    #[test]
    fn it_decodes_v5_single_record() {
        let packet = v5_packet(1, &v5_record());
        let events = collect(&decoder(), &packet, "10.0.0.1");
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(
            event["@timestamp"],
            FieldValue::Timestamp("2023-11-14T22:13:20.000Z".to_string())
        );
        assert_eq!(event["version"], FieldValue::Unsigned(5));
        assert_eq!(event["flow_seq_num"], FieldValue::Unsigned(1));
        assert_eq!(event["engine_type"], FieldValue::Unsigned(1));
        assert_eq!(event["engine_id"], FieldValue::Unsigned(2));
        assert_eq!(event["sampling_algorithm"], FieldValue::Unsigned(1));
        assert_eq!(event["sampling_interval"], FieldValue::Unsigned(3));
        assert_eq!(
            event["ipv4_src_addr"],
            FieldValue::Ip4Addr(Ipv4Addr::new(1, 2, 3, 4))
        );
        assert_eq!(
            event["ipv4_dst_addr"],
            FieldValue::Ip4Addr(Ipv4Addr::new(5, 6, 7, 8))
        );
        assert_eq!(
            event["first_switched"],
            FieldValue::Timestamp("2023-11-14T22:13:15.000Z".to_string())
        );
        assert_eq!(
            event["last_switched"],
            FieldValue::Timestamp("2023-11-14T22:13:19.000Z".to_string())
        );
        assert_eq!(event["in_pkts"], FieldValue::Unsigned(100));
        assert_eq!(event["in_bytes"], FieldValue::Unsigned(4_000));
        assert_eq!(event["protocol"], FieldValue::Unsigned(6));
    }

    #[test]
    fn v5_count_mismatch_drops_datagram() {
        // header says two records, payload carries one
        let packet = v5_packet(2, &v5_record());
        assert!(collect(&decoder(), &packet, "10.0.0.1").is_empty());
    }

    #[test]
    fn v5_switched_times_can_stay_uptime_relative() {
        let decoder = NetflowDecoder::builder()
            .with_switched_times_from_uptime(true)
            .build()
            .expect("default dictionaries load");
        let events = collect(&decoder, &v5_packet(1, &v5_record()), "10.0.0.1");
        assert_eq!(events[0]["first_switched"], FieldValue::Unsigned(995_000));
        assert_eq!(events[0]["last_switched"], FieldValue::Unsigned(999_000));
    }

    fn v9_header(count: u16) -> Wire {
        Wire::default()
            .u16(9)
            .u16(count)
            .u32(1_000_000) // sys_up_time
            .u32(1_700_000_000) // unix_secs
            .u32(7) // sequence_number
            .u32(1) // source_id
    }

    /// Template 256: ipv4_src_addr(4), ipv4_dst_addr(4), in_pkts(4).
    fn v9_template_flowset(w: Wire) -> Wire {
        w.u16(0)
            .u16(20)
            .u16(256)
            .u16(3)
            .u16(8)
            .u16(4)
            .u16(12)
            .u16(4)
            .u16(2)
            .u16(4)
    }

    #[test]
    fn v9_template_then_data() {
        let packet = v9_template_flowset(v9_header(3))
            .u16(256)
            .u16(28) // 2 records x 12 bytes + 4
            .u32(0x0102_0304)
            .u32(0x0506_0708)
            .u32(10)
            .u32(0x0A0B_0C0D)
            .u32(0x0E0F_1011)
            .u32(20)
            .build();
        let events = collect(&decoder(), &packet, "10.0.0.1");
        assert_eq!(events.len(), 2);

        assert_eq!(events[0]["version"], FieldValue::Unsigned(9));
        assert_eq!(events[0]["flow_seq_num"], FieldValue::Unsigned(7));
        assert_eq!(
            events[0]["ipv4_src_addr"],
            FieldValue::Ip4Addr(Ipv4Addr::new(1, 2, 3, 4))
        );
        assert_eq!(events[0]["in_pkts"], FieldValue::Unsigned(10));
        assert_eq!(
            events[1]["ipv4_src_addr"],
            FieldValue::Ip4Addr(Ipv4Addr::new(10, 11, 12, 13))
        );
        assert_eq!(events[1]["in_pkts"], FieldValue::Unsigned(20));
    }

    #[test]
    fn v9_template_survives_for_later_datagrams() {
        let d = decoder();
        let template = v9_template_flowset(v9_header(1)).build();
        assert!(collect(&d, &template, "10.0.0.1").is_empty());

        let data = v9_header(1)
            .u16(256)
            .u16(16)
            .u32(0x0102_0304)
            .u32(0x0506_0708)
            .u32(42)
            .build();
        let events = collect(&d, &data, "10.0.0.1");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["in_pkts"], FieldValue::Unsigned(42));
    }

    #[test]
    fn can_read_v9_from_captured_hex() {
        let template =
            "00090001000f42406553f1000000000700000001000000140100000300080004000c000400020004";
        let data = "00090001000f42406553f10000000007000000010100001001020304050607080000002a";

        let d = decoder();
        assert!(collect(&d, &hex::decode(template).unwrap(), "10.0.0.1").is_empty());
        let events = collect(&d, &hex::decode(data).unwrap(), "10.0.0.1");
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0]["ipv4_src_addr"],
            FieldValue::Ip4Addr(Ipv4Addr::new(1, 2, 3, 4))
        );
        assert_eq!(events[0]["in_pkts"], FieldValue::Unsigned(42));
    }

    #[test]
    fn v9_templates_are_scoped_per_host() {
        let d = decoder();
        let template = v9_template_flowset(v9_header(1)).build();
        collect(&d, &template, "10.0.0.1");

        // Same source id and template id, different exporter host.
        let data = v9_header(1)
            .u16(256)
            .u16(16)
            .u32(1)
            .u32(2)
            .u32(3)
            .build();
        assert!(collect(&d, &data, "10.0.0.2").is_empty());
        assert_eq!(collect(&d, &data, "10.0.0.1").len(), 1);
    }

    #[test]
    fn v9_missing_template_yields_no_events() {
        let packet = v9_header(1)
            .u16(300)
            .u16(16)
            .u32(1)
            .u32(2)
            .u32(3)
            .build();
        assert!(collect(&decoder(), &packet, "10.0.0.1").is_empty());
    }

    #[test]
    fn unknown_field_rejects_whole_template() {
        let d = decoder();
        // field 999 is not in the v9 dictionary; field 8 alone would be fine
        let packet = v9_header(1)
            .u16(0)
            .u16(16)
            .u16(256)
            .u16(2)
            .u16(8)
            .u16(4)
            .u16(999)
            .u16(4)
            .build();
        assert!(collect(&d, &packet, "10.0.0.1").is_empty());
        assert!(d.v9_template_keys().is_empty());

        // follow-on data for the rejected template produces nothing
        let data = v9_header(1)
            .u16(256)
            .u16(12)
            .u32(0x0102_0304)
            .u32(99)
            .build();
        assert!(collect(&d, &data, "10.0.0.1").is_empty());
    }

    /// Options template 257: one scope field plus the three sampler fields.
    fn v9_sampler_options(w: Wire) -> Wire {
        w.u16(1)
            .u16(28)
            .u16(257)
            .u16(4) // scope section bytes
            .u16(12) // option section bytes
            .u16(1)
            .u16(4) // scope_system
            .u16(48)
            .u16(1) // flow_sampler_id
            .u16(49)
            .u16(1) // flow_sampler_mode
            .u16(50)
            .u16(4) // flow_sampler_random_interval
            .u16(0) // padding to a 4-byte boundary
    }

    fn v9_sampler_option_data(w: Wire) -> Wire {
        w.u16(257)
            .u16(14)
            .u32(0) // scope_system
            .u8(2) // sampler id
            .u8(2) // mode
            .u32(100) // random interval
    }

    #[test]
    fn sampler_option_records_decorate_data() {
        let d = decoder();
        let options = v9_sampler_option_data(v9_sampler_options(v9_header(2))).build();
        // the sampler record is routed to the table, not emitted
        assert!(collect(&d, &options, "10.0.0.1").is_empty());
        assert_eq!(d.samplers().len(), 1);

        // template 258: ipv4_src_addr + flow_sampler_id, data padded by 3
        let data = v9_header(2)
            .u16(0)
            .u16(16)
            .u16(258)
            .u16(2)
            .u16(8)
            .u16(4)
            .u16(48)
            .u16(1)
            .u16(258)
            .u16(12)
            .u32(0x0102_0304)
            .u8(2)
            .bytes(&[0, 0, 0])
            .build();
        let events = collect(&d, &data, "10.0.0.1");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["flow_sampler_id"], FieldValue::Unsigned(2));
        assert_eq!(events[0]["sampling_algorithm"], FieldValue::Unsigned(2));
        assert_eq!(events[0]["sampling_interval"], FieldValue::Unsigned(100));
    }

    #[test]
    fn sampler_decoration_never_overwrites() {
        let d = decoder();
        let options = v9_sampler_option_data(v9_sampler_options(v9_header(2))).build();
        collect(&d, &options, "10.0.0.1");

        // template 259 carries its own sampling_algorithm (field 35)
        let data = v9_header(2)
            .u16(0)
            .u16(16)
            .u16(259)
            .u16(2)
            .u16(48)
            .u16(1)
            .u16(35)
            .u16(1)
            .u16(259)
            .u16(6)
            .u8(2) // sampler id matching the table
            .u8(9) // record's own algorithm
            .build();
        let events = collect(&d, &data, "10.0.0.1");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["sampling_algorithm"], FieldValue::Unsigned(9));
        // the missing field is still filled in
        assert_eq!(events[0]["sampling_interval"], FieldValue::Unsigned(100));
    }

    #[test]
    fn samplers_are_scoped_per_host() {
        let d = decoder();
        let options = v9_sampler_option_data(v9_sampler_options(v9_header(2))).build();
        collect(&d, &options, "10.0.0.1");

        let data = v9_header(2)
            .u16(0)
            .u16(16)
            .u16(258)
            .u16(2)
            .u16(8)
            .u16(4)
            .u16(48)
            .u16(1)
            .u16(258)
            .u16(9)
            .u32(0x0102_0304)
            .u8(2)
            .build();
        let events = collect(&d, &data, "10.9.9.9");
        assert_eq!(events.len(), 1);
        assert!(events[0].get("sampling_algorithm").is_none());
    }

    fn ipfix_header(total_length: u16) -> Wire {
        Wire::default()
            .u16(10)
            .u16(total_length)
            .u32(1_700_000_000) // export_time
            .u32(5) // sequence_number
            .u32(99) // observation_domain_id
    }

    /// Template 256: sourceIPv4Address(4), destinationIPv4Address(4),
    /// packetDeltaCount reduced to 4 bytes.
    fn ipfix_template_set(w: Wire) -> Wire {
        w.u16(2)
            .u16(20)
            .u16(256)
            .u16(3)
            .u16(8)
            .u16(4)
            .u16(12)
            .u16(4)
            .u16(2)
            .u16(4)
    }

    #[test]
    fn ipfix_template_then_data() {
        let packet = ipfix_template_set(ipfix_header(52))
            .u16(256)
            .u16(16)
            .u32(0x0102_0304)
            .u32(0x0506_0708)
            .u32(17)
            .build();
        let events = collect(&decoder(), &packet, "10.0.0.1");
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event["version"], FieldValue::Unsigned(10));
        assert!(event.get("flow_seq_num").is_none());
        assert_eq!(
            event["sourceIPv4Address"],
            FieldValue::Ip4Addr(Ipv4Addr::new(1, 2, 3, 4))
        );
        assert_eq!(event["packetDeltaCount"], FieldValue::Unsigned(17));
    }

    #[test]
    fn ipfix_options_template_registers_sampler() {
        let d = decoder();

        // options template 265: observationDomainId as scope plus the
        // three sampler fields, padded to a 4-byte boundary
        let options_template = ipfix_header(44)
            .u16(3)
            .u16(28)
            .u16(265)
            .u16(4) // field count
            .u16(1) // scope field count
            .u16(149)
            .u16(4)
            .u16(48)
            .u16(1)
            .u16(49)
            .u16(1)
            .u16(50)
            .u16(4)
            .u16(0) // padding
            .build();
        assert!(collect(&d, &options_template, "10.0.0.1").is_empty());

        // the option data populates the sampler table without emitting
        let option_data = ipfix_header(30)
            .u16(265)
            .u16(14)
            .u32(99)
            .u8(2) // sampler id
            .u8(1) // mode
            .u32(64) // random interval
            .build();
        assert!(collect(&d, &option_data, "10.0.0.1").is_empty());
        assert_eq!(d.samplers().len(), 1);

        // data template 266 references the sampler by id
        let template = ipfix_header(32)
            .u16(2)
            .u16(16)
            .u16(266)
            .u16(2)
            .u16(8)
            .u16(4)
            .u16(48)
            .u16(1)
            .build();
        collect(&d, &template, "10.0.0.1");

        let data = ipfix_header(28)
            .u16(266)
            .u16(12)
            .u32(0x0102_0304)
            .u8(2)
            .bytes(&[0, 0, 0]) // padding
            .build();
        let events = collect(&d, &data, "10.0.0.1");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["sampling_algorithm"], FieldValue::Unsigned(1));
        assert_eq!(events[0]["sampling_interval"], FieldValue::Unsigned(64));
    }

    #[test]
    fn ipfix_missing_template_yields_no_events() {
        let packet = ipfix_header(28)
            .u16(300)
            .u16(12)
            .u64(0)
            .build();
        assert!(collect(&decoder(), &packet, "10.0.0.1").is_empty());
    }

    #[test]
    fn ipfix_flow_start_nanoseconds_is_ntp() {
        let ntp = ((crate::time::NTP_TO_UNIX_SECS + 1_700_000_000) << 32) | 0x8000_0000;
        let packet = ipfix_header(40)
            .u16(2)
            .u16(12)
            .u16(260)
            .u16(1)
            .u16(156)
            .u16(8)
            .u16(260)
            .u16(12)
            .u64(ntp)
            .build();
        let events = collect(&decoder(), &packet, "10.0.0.1");
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0]["flowStartNanoseconds"],
            FieldValue::Timestamp("2023-11-14T22:13:20.500000000Z".to_string())
        );
    }

    #[test]
    fn v9_flow_nanoseconds_are_unix_epoch() {
        // Same field name, different wire semantics per version.
        let ctx = RecordContext {
            version: 9,
            unix_secs: 1_700_000_000,
            unix_nsecs: 0,
            sys_up_time: Some(1_000_000),
            flow_seq_num: Some(1),
            template_id: 256,
            include_flowset_id: false,
            switched_times_from_uptime: false,
            host: None,
            source_id: 1,
        };
        let normalized = record::normalize(
            "flowStartNanoseconds",
            FieldValue::Unsigned(1_700_000_000_500_000_000),
            &ctx,
        );
        assert_eq!(
            normalized,
            FieldValue::Timestamp("2023-11-14T22:13:20.500000000Z".to_string())
        );
    }

    #[test]
    fn ipfix_millisecond_stamps_convert() {
        let packet = ipfix_header(40)
            .u16(2)
            .u16(12)
            .u16(262)
            .u16(1)
            .u16(152)
            .u16(8) // flowStartMilliseconds
            .u16(262)
            .u16(12)
            .u64(1_700_000_000_250)
            .build();
        let events = collect(&decoder(), &packet, "10.0.0.1");
        assert_eq!(
            events[0]["flowStartMilliseconds"],
            FieldValue::Timestamp("2023-11-14T22:13:20.250Z".to_string())
        );
    }

    #[test]
    fn ipfix_second_stamps_have_no_fraction() {
        let packet = ipfix_header(36)
            .u16(2)
            .u16(12)
            .u16(263)
            .u16(1)
            .u16(150)
            .u16(4) // flowStartSeconds
            .u16(263)
            .u16(8)
            .u32(1_700_000_000)
            .build();
        let events = collect(&decoder(), &packet, "10.0.0.1");
        assert_eq!(
            events[0]["flowStartSeconds"],
            FieldValue::Timestamp("2023-11-14T22:13:20".to_string())
        );
    }

    #[test]
    fn ipfix_variable_length_string() {
        // interfaceName with the sentinel length: one-byte prefix on the wire
        let packet = ipfix_header(37)
            .u16(2)
            .u16(12)
            .u16(261)
            .u16(1)
            .u16(82)
            .u16(VARIABLE_LENGTH)
            .u16(261)
            .u16(9)
            .u8(4)
            .bytes(b"eth0")
            .build();
        let events = collect(&decoder(), &packet, "10.0.0.1");
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0]["interfaceName"],
            FieldValue::String("eth0".to_string())
        );
    }

    #[test]
    fn ipfix_include_flowset_id() {
        let d = NetflowDecoder::builder()
            .with_include_flowset_id(true)
            .build()
            .expect("default dictionaries load");
        let packet = ipfix_template_set(ipfix_header(52))
            .u16(256)
            .u16(16)
            .u32(1)
            .u32(2)
            .u32(3)
            .build();
        let events = collect(&d, &packet, "10.0.0.1");
        assert_eq!(events[0]["flowset_id"], FieldValue::Unsigned(256));
    }

    #[test]
    fn version_filter_drops_datagrams() {
        let d = NetflowDecoder::builder()
            .with_allowed_versions([9, 10].into())
            .build()
            .expect("default dictionaries load");
        assert!(collect(&d, &v5_packet(1, &v5_record()), "10.0.0.1").is_empty());
    }

    #[test]
    fn unsupported_version_is_dropped() {
        let packet = Wire::default().u16(8).bytes(&[0; 22]).build();
        assert!(collect(&decoder(), &packet, "10.0.0.1").is_empty());
    }

    #[test]
    fn truncated_flowset_drops_datagram_but_not_decoder() {
        let d = decoder();
        // flowset declares 40 bytes of body, datagram ends early
        let packet = v9_header(1).u16(0).u16(44).u16(256).u16(3).build();
        assert!(collect(&d, &packet, "10.0.0.1").is_empty());
        // decoder still works afterwards
        let events = collect(&d, &v5_packet(1, &v5_record()), "10.0.0.1");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn template_round_trip_preserves_widths_and_values() {
        let dictionary = FieldDictionary::netflow_v9(None).expect("built-in dictionary");
        let registry = TemplateRegistry::new(Duration::from_secs(60), None);
        let raw = [
            RawField::new(1, 4),  // in_bytes
            RawField::new(8, 4),  // ipv4_src_addr
            RawField::new(7, 2),  // l4_src_port
            RawField::new(10, 3), // input_snmp, reduced-size
        ];
        let key = TemplateKey::new(Some("h"), 1, 256);
        let template = registry
            .register(key.clone(), &raw, &dictionary, None)
            .expect("all fields known");

        // width equals the sum of the wire lengths
        assert_eq!(template.fixed_width(), Some(13));
        assert_eq!(registry.fetch(&key).as_ref(), Some(&template));

        let bytes = Wire::default()
            .u32(1_000)
            .u32(0x0102_0304)
            .u16(8080)
            .bytes(&[0, 0, 7])
            .build();
        let decode = |input: &[u8]| {
            let mut remaining = input;
            let mut values = Vec::new();
            for spec in template.fields() {
                let (rest, decoded) = spec.read(remaining).expect("fits");
                remaining = rest;
                values.extend(decoded.map(|(name, value)| (name.to_string(), value)));
            }
            assert!(remaining.is_empty());
            values
        };

        let values = decode(&bytes);
        assert_eq!(values[0], ("in_bytes".to_string(), FieldValue::Unsigned(1_000)));

        // re-encode through the resolved widths and decode again
        let mut reencoded = Vec::new();
        for (spec, (_, value)) in template.fields().iter().zip(&values) {
            match value {
                FieldValue::Unsigned(v) => {
                    let width = spec.width().expect("fixed");
                    reencoded.extend_from_slice(&v.to_be_bytes()[8 - width..]);
                }
                FieldValue::Ip4Addr(ip) => reencoded.extend_from_slice(&ip.octets()),
                other => panic!("unexpected value {other:?}"),
            }
        }
        assert_eq!(reencoded, bytes);
        assert_eq!(decode(&reencoded), values);
    }

    #[test]
    fn template_ttl_expires_and_refreshes() {
        let dictionary = FieldDictionary::netflow_v9(None).expect("built-in dictionary");
        let registry = TemplateRegistry::new(Duration::from_millis(50), None);
        let key = TemplateKey::new(None, 1, 256);
        let raw = [RawField::new(1, 4)];

        registry.register(key.clone(), &raw, &dictionary, None);
        assert!(registry.fetch(&key).is_some());

        thread::sleep(Duration::from_millis(80));
        assert!(registry.fetch(&key).is_none());

        registry.register(key.clone(), &raw, &dictionary, None);
        assert!(registry.fetch(&key).is_some());
    }

    #[test]
    fn validator_rejection_prevents_caching() {
        let dictionary = FieldDictionary::netflow_v9(None).expect("built-in dictionary");
        let registry = TemplateRegistry::new(Duration::from_secs(60), None);
        let key = TemplateKey::new(None, 1, 256);
        let reject = |_: &crate::Template| TemplateAck::Reject;

        let registered =
            registry.register(key.clone(), &[RawField::new(1, 4)], &dictionary, Some(&reject));
        assert!(registered.is_none());
        assert!(registry.fetch(&key).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_template_warns_once_per_key() {
        let log = crate::variable_versions::registry::MissingTemplateLog::default();
        let key = TemplateKey::new(Some("h"), 1, 300);
        assert!(log.first_miss(&key));
        assert!(!log.first_miss(&key));
        assert!(log.first_miss(&TemplateKey::new(Some("h"), 1, 301)));
    }

    #[test]
    fn dictionary_knows_scope_and_option_categories() {
        let dictionary = FieldDictionary::netflow_v9(None).expect("built-in dictionary");
        assert!(dictionary.lookup(&RawField::scoped(1, 4)).is_some());
        assert!(dictionary.lookup(&RawField::new(1, 4)).is_some());
        // scope ids only exist in the scope category
        assert_eq!(
            dictionary.lookup(&RawField::scoped(1, 4)).map(|d| d.name.as_str()),
            Some("scope_system")
        );
    }

    #[test]
    fn missing_definitions_file_is_fatal() {
        let err = NetflowDecoder::builder()
            .with_definitions("/nonexistent/fields.yaml")
            .build()
            .expect_err("missing file must fail construction");
        assert!(matches!(err, crate::ConfigError::Io { .. }));
    }

    #[test]
    fn string_fields_trim_right_padding() {
        let packet = ipfix_header(40)
            .u16(2)
            .u16(12)
            .u16(264)
            .u16(1)
            .u16(82)
            .u16(8) // fixed-width interfaceName
            .u16(264)
            .u16(12)
            .bytes(b"eth0\0\0\0\0")
            .build();
        let events = collect(&decoder(), &packet, "10.0.0.1");
        assert_eq!(
            events[0]["interfaceName"],
            FieldValue::String("eth0".to_string())
        );
    }

    #[test]
    fn mac_addresses_render_colon_separated() {
        let packet = v9_header(2)
            .u16(0)
            .u16(12)
            .u16(256)
            .u16(1)
            .u16(56)
            .u16(6) // in_src_mac
            .u16(256)
            .u16(10)
            .bytes(&[0xaa, 0xbb, 0xcc, 0x00, 0x11, 0x22])
            .build();
        let events = collect(&decoder(), &packet, "10.0.0.1");
        assert_eq!(
            events[0]["in_src_mac"],
            FieldValue::MacAddr("aa:bb:cc:00:11:22".to_string())
        );
    }

    #[test]
    fn application_id_composes_engine_and_selector() {
        let packet = v9_header(2)
            .u16(0)
            .u16(12)
            .u16(256)
            .u16(1)
            .u16(95)
            .u16(4) // application_id
            .u16(256)
            .u16(8)
            .u8(3)
            .bytes(&[0, 0, 53])
            .build();
        let events = collect(&decoder(), &packet, "10.0.0.1");
        assert_eq!(
            events[0]["application_id"],
            FieldValue::ApplicationId(crate::ApplicationId {
                classification_engine_id: 3,
                selector_id: 53,
            })
        );
    }
}
