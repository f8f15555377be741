//! Render a model file as a C byte array for firmware builds.

use std::fmt::Write;

const BYTES_PER_LINE: usize = 12;

/// C source declaring `name` as the bytes of the model and `name_len` as
/// its length.
pub fn to_c_array(name: &str, bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 6 + 128);
    let _ = writeln!(out, "const unsigned char {name}[] = {{");
    for chunk in bytes.chunks(BYTES_PER_LINE) {
        out.push_str("  ");
        for byte in chunk {
            let _ = write!(out, "0x{byte:02x}, ");
        }
        out.push('\n');
    }
    out.push_str("};\n");
    let _ = writeln!(out, "const unsigned int {name}_len = {};", bytes.len());
    out
}
