pub mod ring;

pub use ring::SpscRing;
