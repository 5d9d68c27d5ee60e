pub mod activity;
pub mod agent;
pub mod atmosphere;
pub mod behavior;
pub mod conductor;
pub mod ensemble;
pub mod event;
pub mod granular;
pub mod synth;
pub mod tasks;
pub mod texture;
