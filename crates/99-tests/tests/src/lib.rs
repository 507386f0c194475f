//! Cross-crate scenarios for the messaging substrate.

#[cfg(test)]
mod scenarios;

#[cfg(test)]
mod system;
