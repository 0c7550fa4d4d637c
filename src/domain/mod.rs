// Domain layer: port/pair entities, command descriptions and the seams (traits)
// used by the orchestration layer.

pub mod command;
pub mod model;
pub mod ports;
