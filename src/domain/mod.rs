// Domain layer: typed catalog records, ports, and the pricing rules applied to them.

pub mod model;
pub mod ports;
pub mod services;
