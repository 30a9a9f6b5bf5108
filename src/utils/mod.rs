mod parse;

pub use parse::{field_value, first_field_value};
