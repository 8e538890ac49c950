//! Domain models for the inventory and order-fulfillment core

mod confirmation;
mod order;
mod sale;
mod stock;

pub use confirmation::*;
pub use order::*;
pub use sale::*;
pub use stock::*;
