//! Bundled subset of the IANA IPFIX Information Element registry.
//!
//! Reference: <https://www.iana.org/assignments/ipfix/ipfix.xhtml>
//!
//! This covers the elements ordinary flow exporters emit; site-specific
//! registries are loaded on top of it with
//! [`use_specfile`](super::use_specfile).

use crate::types::{IeType, VARLEN};

/// `(element number, name, abstract data type, default length)`
pub(crate) const IANA_IES: &[(u16, &str, IeType, u16)] = &[
    (1, "octetDeltaCount", IeType::Unsigned64, 8),
    (2, "packetDeltaCount", IeType::Unsigned64, 8),
    (4, "protocolIdentifier", IeType::Unsigned8, 1),
    (5, "ipClassOfService", IeType::Unsigned8, 1),
    (6, "tcpControlBits", IeType::Unsigned16, 2),
    (7, "sourceTransportPort", IeType::Unsigned16, 2),
    (8, "sourceIPv4Address", IeType::Ipv4Address, 4),
    (9, "sourceIPv4PrefixLength", IeType::Unsigned8, 1),
    (10, "ingressInterface", IeType::Unsigned32, 4),
    (11, "destinationTransportPort", IeType::Unsigned16, 2),
    (12, "destinationIPv4Address", IeType::Ipv4Address, 4),
    (13, "destinationIPv4PrefixLength", IeType::Unsigned8, 1),
    (14, "egressInterface", IeType::Unsigned32, 4),
    (15, "ipNextHopIPv4Address", IeType::Ipv4Address, 4),
    (16, "bgpSourceAsNumber", IeType::Unsigned32, 4),
    (17, "bgpDestinationAsNumber", IeType::Unsigned32, 4),
    (18, "bgpNextHopIPv4Address", IeType::Ipv4Address, 4),
    (19, "postMCastPacketDeltaCount", IeType::Unsigned64, 8),
    (20, "postMCastOctetDeltaCount", IeType::Unsigned64, 8),
    (21, "flowEndSysUpTime", IeType::Unsigned32, 4),
    (22, "flowStartSysUpTime", IeType::Unsigned32, 4),
    (23, "postOctetDeltaCount", IeType::Unsigned64, 8),
    (24, "postPacketDeltaCount", IeType::Unsigned64, 8),
    (25, "minimumIpTotalLength", IeType::Unsigned64, 8),
    (26, "maximumIpTotalLength", IeType::Unsigned64, 8),
    (27, "sourceIPv6Address", IeType::Ipv6Address, 16),
    (28, "destinationIPv6Address", IeType::Ipv6Address, 16),
    (29, "sourceIPv6PrefixLength", IeType::Unsigned8, 1),
    (30, "destinationIPv6PrefixLength", IeType::Unsigned8, 1),
    (31, "flowLabelIPv6", IeType::Unsigned32, 4),
    (32, "icmpTypeCodeIPv4", IeType::Unsigned16, 2),
    (33, "igmpType", IeType::Unsigned8, 1),
    (36, "flowActiveTimeout", IeType::Unsigned16, 2),
    (37, "flowIdleTimeout", IeType::Unsigned16, 2),
    (40, "exportedOctetTotalCount", IeType::Unsigned64, 8),
    (41, "exportedMessageTotalCount", IeType::Unsigned64, 8),
    (42, "exportedFlowRecordTotalCount", IeType::Unsigned64, 8),
    (44, "sourceIPv4Prefix", IeType::Ipv4Address, 4),
    (45, "destinationIPv4Prefix", IeType::Ipv4Address, 4),
    (52, "minimumTTL", IeType::Unsigned8, 1),
    (53, "maximumTTL", IeType::Unsigned8, 1),
    (54, "fragmentIdentification", IeType::Unsigned32, 4),
    (55, "postIpClassOfService", IeType::Unsigned8, 1),
    (56, "sourceMacAddress", IeType::MacAddress, 6),
    (57, "postDestinationMacAddress", IeType::MacAddress, 6),
    (58, "vlanId", IeType::Unsigned16, 2),
    (59, "postVlanId", IeType::Unsigned16, 2),
    (60, "ipVersion", IeType::Unsigned8, 1),
    (61, "flowDirection", IeType::Unsigned8, 1),
    (62, "ipNextHopIPv6Address", IeType::Ipv6Address, 16),
    (63, "bgpNextHopIPv6Address", IeType::Ipv6Address, 16),
    (64, "ipv6ExtensionHeaders", IeType::Unsigned32, 4),
    (80, "destinationMacAddress", IeType::MacAddress, 6),
    (81, "postSourceMacAddress", IeType::MacAddress, 6),
    (82, "interfaceName", IeType::String, VARLEN),
    (83, "interfaceDescription", IeType::String, VARLEN),
    (85, "octetTotalCount", IeType::Unsigned64, 8),
    (86, "packetTotalCount", IeType::Unsigned64, 8),
    (88, "fragmentOffset", IeType::Unsigned16, 2),
    (94, "applicationDescription", IeType::String, VARLEN),
    (95, "applicationId", IeType::OctetArray, VARLEN),
    (96, "applicationName", IeType::String, VARLEN),
    (98, "postIpDiffServCodePoint", IeType::Unsigned8, 1),
    (130, "exporterIPv4Address", IeType::Ipv4Address, 4),
    (131, "exporterIPv6Address", IeType::Ipv6Address, 16),
    (132, "droppedOctetDeltaCount", IeType::Unsigned64, 8),
    (133, "droppedPacketDeltaCount", IeType::Unsigned64, 8),
    (136, "flowEndReason", IeType::Unsigned8, 1),
    (138, "observationPointId", IeType::Unsigned64, 8),
    (143, "meteringProcessId", IeType::Unsigned32, 4),
    (144, "exportingProcessId", IeType::Unsigned32, 4),
    (145, "templateId", IeType::Unsigned16, 2),
    (148, "flowId", IeType::Unsigned64, 8),
    (149, "observationDomainId", IeType::Unsigned32, 4),
    (150, "flowStartSeconds", IeType::DateTimeSeconds, 4),
    (151, "flowEndSeconds", IeType::DateTimeSeconds, 4),
    (152, "flowStartMilliseconds", IeType::DateTimeMilliseconds, 8),
    (153, "flowEndMilliseconds", IeType::DateTimeMilliseconds, 8),
    (154, "flowStartMicroseconds", IeType::DateTimeMicroseconds, 8),
    (155, "flowEndMicroseconds", IeType::DateTimeMicroseconds, 8),
    (156, "flowStartNanoseconds", IeType::DateTimeNanoseconds, 8),
    (157, "flowEndNanoseconds", IeType::DateTimeNanoseconds, 8),
    (161, "flowDurationMilliseconds", IeType::Unsigned32, 4),
    (162, "flowDurationMicroseconds", IeType::Unsigned32, 4),
    (176, "icmpTypeIPv4", IeType::Unsigned8, 1),
    (177, "icmpCodeIPv4", IeType::Unsigned8, 1),
    (184, "tcpSequenceNumber", IeType::Unsigned32, 4),
    (185, "tcpAcknowledgementNumber", IeType::Unsigned32, 4),
    (186, "tcpWindowSize", IeType::Unsigned16, 2),
    (189, "ipHeaderLength", IeType::Unsigned8, 1),
    (192, "ipTTL", IeType::Unsigned8, 1),
    (205, "udpMessageLength", IeType::Unsigned16, 2),
    (206, "isMulticast", IeType::Unsigned8, 1),
    (210, "paddingOctets", IeType::OctetArray, VARLEN),
    (224, "ipTotalLength", IeType::Unsigned64, 8),
    (225, "postNATSourceIPv4Address", IeType::Ipv4Address, 4),
    (226, "postNATDestinationIPv4Address", IeType::Ipv4Address, 4),
    (227, "postNAPTSourceTransportPort", IeType::Unsigned16, 2),
    (228, "postNAPTDestinationTransportPort", IeType::Unsigned16, 2),
    (233, "firewallEvent", IeType::Unsigned8, 1),
    (239, "biflowDirection", IeType::Unsigned8, 1),
    (243, "dot1qVlanId", IeType::Unsigned16, 2),
    (245, "dot1qCustomerVlanId", IeType::Unsigned16, 2),
    (256, "ethernetType", IeType::Unsigned16, 2),
    (276, "dataRecordsReliability", IeType::Boolean, 1),
];

/// Elements RFC 5103 marks as describing the export process or the biflow
/// itself; no reverse counterpart is derived for these.
pub(crate) const NON_REVERSIBLE: &[u16] =
    &[40, 41, 42, 130, 131, 143, 144, 145, 149, 210, 239, 276];
