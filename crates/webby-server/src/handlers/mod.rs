//! Control API request handlers.

pub(crate) mod assets;
pub(crate) mod servers;
pub(crate) mod status;
