//! # Utility Functions and Types
//!
//! Common helpers used throughout the crate.
//!
//! ## Bit Operations
//!
//! The bits module provides utilities for working with bit-level data:
//!
//! ```rust
//! use h265dec::utils::BitReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = vec![0b10110011u8];
//! let mut reader = BitReader::new(&data);
//!
//! // Read specific number of bits
//! let value = reader.read_bits(3)?; // Reads first 3 bits (101)
//! assert_eq!(value, 0b101);
//! # Ok(())
//! # }
//! ```

/// Bit manipulation and bitstream reading utilities
pub mod bits;

pub use bits::BitReader;
