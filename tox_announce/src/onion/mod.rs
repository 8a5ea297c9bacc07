/*! Onion announce node: announce list, ping ids and data forwarding.
*/

pub mod errors;
pub mod ping_id;
pub mod entries;
pub mod extra_data;
pub mod onion_announce;
pub mod data_receiver;
