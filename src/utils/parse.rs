/// Value of a `key : value` cpuinfo line, matched by prefix.
///
/// Kernels vary between `CPU part\t: 0xd03` and `CPU part : 0xd03`; the
/// separator is any run of tabs, spaces, and a colon. The value keeps any
/// trailing text untouched.
pub fn field_value<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)
        .map(|rest| rest.trim_start_matches([' ', '\t', ':']))
}

/// First line in `text` matching `prefix`, as a field value.
pub fn first_field_value<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.lines().find_map(|line| field_value(line, prefix))
}
