/*!
Onion announce service of the [Tox protocol](https://zetok.github.io/tox-spec).

Onion announce node stores announcements of other nodes, answers lookups for
them and forwards data requests to announced nodes through their onion paths.

Repo: https://github.com/tox-rs/tox

*/

#![forbid(unsafe_code)]
#![doc(html_logo_url = "https://raw.githubusercontent.com/tox-rs/logo/master/logo.png")]

#[macro_use]
extern crate log;
#[macro_use]
extern crate cookie_factory;

pub mod time;
pub mod config;
pub mod distance;
pub mod precomputed_cache;
pub mod onion;
