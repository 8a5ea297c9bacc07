/*!
Encoding and decoding of the packets used by the tox onion announce protocol.

Every packet implements [`FromBytes`](../tox_binary_io/trait.FromBytes.html)
and [`ToBytes`](../tox_binary_io/trait.ToBytes.html). Encrypted packets have
`new` and `get_payload` methods that seal and open their payloads.
*/

#![forbid(unsafe_code)]
#![doc(html_logo_url = "https://raw.githubusercontent.com/tox-rs/logo/master/logo.png")]
// Remove it when it will be fixed in nom parser
#![allow(clippy::redundant_closure)]

#[macro_use]
extern crate cookie_factory;

pub mod errors;
pub mod packed_node;
pub mod onion;
