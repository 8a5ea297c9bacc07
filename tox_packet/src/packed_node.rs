/*! A pair of SocketAddr & PublicKey.
*/

use nom::{
    branch::alt,
    bytes::complete::tag,
    combinator::map,
    number::complete::be_u16,
    sequence::preceded,
};

use std::net::{
    IpAddr,
    Ipv4Addr,
    Ipv6Addr,
    SocketAddr,
    SocketAddrV4
};

use tox_binary_io::*;
use tox_crypto::*;

/// Size of serialized `PackedNode` with IPv4 address.
pub const PACKED_NODE_IPV4_SIZE: usize = 1 + 4 + 2 + PUBLICKEYBYTES;
/// Size of serialized `PackedNode` with IPv6 address.
pub const PACKED_NODE_IPV6_SIZE: usize = 1 + 16 + 2 + PUBLICKEYBYTES;

/** `PackedNode` format is a way to store the node info in a small yet easy to
parse format.

Announce responses carry the nodes closest to the searched key in this format.

To store more than one node, simply append another on to the previous one:

`[packed node 1][packed node 2][...]`

Serialized Packed node:

Length | Content
------ | -------
1      | Ip type (v4 or v6)
4 or 16| IPv4 or IPv6 address
2      | port
32     | node ID

Size of serialized `PackedNode` is 39 bytes with IPv4 node info, or 51 with
IPv6 node info.

Only UDP variants of Ip type are used, given that onion announce runs
solely on the UDP.
*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackedNode {
    /// Socket addr of node.
    pub saddr: SocketAddr,
    /// Public Key of the node.
    pub pk: PublicKey,
}

impl ToBytes for PackedNode {
    #[rustfmt::skip]
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_be_u8!(self.ip_type()) >>
            gen_call!(|buf, addr| IpAddr::to_bytes(addr, buf), &self.saddr.ip()) >>
            gen_be_u16!(self.saddr.port()) >>
            gen_slice!(self.pk.as_bytes())
        )
    }
}

/** Deserialize bytes into `PackedNode`.

Can fail if:

 - Ip type is not UDP IPv4 (2) or UDP IPv6 (10)
 - length is too short for given Ip Type
 - PK can't be parsed
*/
impl FromBytes for PackedNode {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, addr) = alt((
            preceded(tag(&[2][..]), map(Ipv4Addr::from_bytes, IpAddr::V4)),
            preceded(tag(&[10][..]), map(Ipv6Addr::from_bytes, IpAddr::V6)),
        ))(input)?;
        let (input, port) = be_u16(input)?;
        let (input, pk) = PublicKey::from_bytes(input)?;
        Ok((input, PackedNode::new(SocketAddr::new(addr, port), pk)))
    }
}

impl PackedNode {
    /// Create new `PackedNode`. The IPv6 address will be converted to IPv4 if
    /// it's IPv4-mapped.
    pub fn new(saddr: SocketAddr, pk: PublicKey) -> Self {
        PackedNode { saddr: PackedNode::ipv6_to_ipv4(saddr), pk }
    }

    /// Convert IPv6 address to IPv4 if it's IPv4-mapped. Otherwise return
    /// original address.
    fn ipv6_to_ipv4(saddr: SocketAddr) -> SocketAddr {
        match saddr {
            SocketAddr::V4(v4) => SocketAddr::V4(v4),
            SocketAddr::V6(v6) => {
                if let Some(converted_ip4) = v6.ip().to_ipv4_mapped() {
                    SocketAddr::V4(SocketAddrV4::new(converted_ip4, v6.port()))
                } else {
                    SocketAddr::V6(v6)
                }
            },
        }
    }

    /// Get an IP type from the `PackedNode`.
    pub fn ip_type(&self) -> u8 {
        if self.saddr.is_ipv4() {
            2
        } else {
            10
        }
    }

    /// Number of bytes this node occupies when serialized.
    pub fn size(&self) -> usize {
        if self.saddr.is_ipv4() {
            PACKED_NODE_IPV4_SIZE
        } else {
            PACKED_NODE_IPV6_SIZE
        }
    }
}
