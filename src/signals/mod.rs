//! Signal substrate: typed values, commanded state, catalog lookup and the
//! live bus capability.

pub mod bus;
pub mod catalog;
pub mod store;
pub mod value;
