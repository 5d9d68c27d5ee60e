pub mod music;
pub mod random;
pub mod timebase;
