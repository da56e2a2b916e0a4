//! Inbound and outbound data interfaces (CSV replay input and state output).

pub mod csv;
