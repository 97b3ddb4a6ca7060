//! Phase barrier table (§4.2.5)

use crate::model::ObjectType;

/// Number of populated phases in the fixed ordering.
pub const PHASE_COUNT: usize = 9;

/// Phase table, index = phase number. `SystemBarrier` is deliberately absent:
/// barrier nodes are synthetic and never looked up by this table.
const PHASES: [&[ObjectType]; PHASE_COUNT] = [
    &[
        ObjectType::DeviceType,
        ObjectType::TagGroup,
        ObjectType::UdfDefinition,
        ObjectType::UdlDefinition,
        ObjectType::MacPool,
    ],
    &[ObjectType::DeviceSubtype, ObjectType::Tag],
    &[
        ObjectType::Location,
        ObjectType::Ip4Block,
        ObjectType::Ip4Network,
        ObjectType::Ip6Block,
        ObjectType::Ip6Network,
    ],
    &[ObjectType::DnsZone, ObjectType::Acl],
    &[ObjectType::ExternalHostRecord],
    &[
        ObjectType::HostRecord,
        ObjectType::Ip4Address,
        ObjectType::Ip6Address,
        ObjectType::Ip4Group,
        ObjectType::MacAddress,
    ],
    &[
        ObjectType::AliasRecord,
        ObjectType::MxRecord,
        ObjectType::SrvRecord,
        ObjectType::TxtRecord,
        ObjectType::GenericRecord,
    ],
    &[ObjectType::Device],
    &[
        ObjectType::Ipv4DhcpRange,
        ObjectType::Ipv6DhcpRange,
        ObjectType::Dhcpv4ClientClass,
        ObjectType::DhcpDeploymentRole,
        ObjectType::DnsDeploymentRole,
        ObjectType::Dhcpv4ClientDeploymentOption,
        ObjectType::Dhcpv4ServiceDeploymentOption,
        ObjectType::DeviceAddress,
        ObjectType::ResourceTag,
        ObjectType::UserDefinedLink,
        ObjectType::AccessRight,
    ],
];

/// The phase index for `object_type`, or `None` for `SystemBarrier` (which
/// has no phase of its own — barrier nodes sit *between* phases).
pub fn phase_of(object_type: ObjectType) -> Option<usize> {
    PHASES.iter().position(|types| types.contains(&object_type))
}

/// Object types assigned to `phase`, or an empty slice if out of range.
pub fn object_types_in_phase(phase: usize) -> &'static [ObjectType] {
    PHASES.get(phase).copied().unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_non_barrier_object_type_has_a_phase() {
        let all = [
            ObjectType::DeviceType,
            ObjectType::TagGroup,
            ObjectType::UdfDefinition,
            ObjectType::UdlDefinition,
            ObjectType::MacPool,
            ObjectType::DeviceSubtype,
            ObjectType::Tag,
            ObjectType::Location,
            ObjectType::Ip4Block,
            ObjectType::Ip4Network,
            ObjectType::Ip6Block,
            ObjectType::Ip6Network,
            ObjectType::DnsZone,
            ObjectType::Acl,
            ObjectType::ExternalHostRecord,
            ObjectType::HostRecord,
            ObjectType::Ip4Address,
            ObjectType::Ip6Address,
            ObjectType::Ip4Group,
            ObjectType::MacAddress,
            ObjectType::AliasRecord,
            ObjectType::MxRecord,
            ObjectType::SrvRecord,
            ObjectType::TxtRecord,
            ObjectType::GenericRecord,
            ObjectType::Device,
            ObjectType::Ipv4DhcpRange,
            ObjectType::Ipv6DhcpRange,
            ObjectType::Dhcpv4ClientClass,
            ObjectType::DhcpDeploymentRole,
            ObjectType::DnsDeploymentRole,
            ObjectType::Dhcpv4ClientDeploymentOption,
            ObjectType::Dhcpv4ServiceDeploymentOption,
            ObjectType::DeviceAddress,
            ObjectType::ResourceTag,
            ObjectType::UserDefinedLink,
            ObjectType::AccessRight,
        ];
        for ty in all {
            assert!(phase_of(ty).is_some(), "{ty} has no phase assignment");
        }
    }

    #[test]
    fn system_barrier_has_no_phase() {
        assert_eq!(phase_of(ObjectType::SystemBarrier), None);
    }

    #[test]
    fn phases_are_ordered_create_forward() {
        assert!(phase_of(ObjectType::DeviceType) < phase_of(ObjectType::Location));
        assert!(phase_of(ObjectType::DnsZone) < phase_of(ObjectType::HostRecord));
        assert!(phase_of(ObjectType::Device) < phase_of(ObjectType::Ipv4DhcpRange));
    }
}
