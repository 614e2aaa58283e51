//! Name-based hints: purpose guesses and module grouping.
//!
//! Decompiled code rarely keeps meaningful names, but when it does (symbols
//! left in, or names restored by an analyst) they are the cheapest signal
//! available about what a function is for.

/// Purpose hints keyed by lowercase name fragments, checked in order.
const PURPOSE_TABLE: &[(&[&str], &str)] = &[
    (&["main", "entry", "_start"], "program entry point"),
    (&["init", "setup", "create", "open"], "initialization"),
    (&["free", "destroy", "cleanup", "close", "release"], "resource release"),
    (&["get", "read", "fetch", "load"], "data access (read)"),
    (&["set", "write", "store", "save"], "data access (write)"),
    (&["send", "recv", "transmit", "receive"], "network or bus I/O"),
    (&["parse", "decode", "unpack"], "input parsing"),
    (&["encode", "pack", "serialize"], "output encoding"),
    (&["crc", "checksum", "hash"], "integrity check"),
    (&["crypt", "cipher", "aes", "md5", "sha"], "cryptography"),
    (&["modbus"], "Modbus protocol"),
    (&["tcp", "socket", "connect"], "TCP networking"),
    (&["rtu", "serial", "uart"], "serial line"),
    (&["thunk"], "import thunk"),
];

/// Guess what a function does from its name. Empty when nothing matches.
pub fn purpose_hints(name: &str) -> Vec<&'static str> {
    let lower = name.to_ascii_lowercase();
    let mut hints: Vec<&'static str> = PURPOSE_TABLE
        .iter()
        .filter(|(keys, _)| keys.iter().any(|k| lower.contains(k)))
        .map(|(_, hint)| *hint)
        .collect();
    if is_decompiler_placeholder(name) {
        hints.push("unnamed decompiler function");
    }
    hints
}

/// `FUN_00401000`, `sub_401000` and friends.
pub fn is_decompiler_placeholder(name: &str) -> bool {
    ["FUN_", "sub_", "thunk_FUN_", "LAB_"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Coarse module group used to color and cluster diagrams.
pub fn module_group(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.contains("modbus") {
        "modbus"
    } else if lower.contains("tcp") || lower.contains("socket") {
        "network"
    } else if lower.contains("rtu") || lower.contains("serial") {
        "serial"
    } else if lower.contains("init") || lower.contains("free") {
        "lifecycle"
    } else if lower.contains("get") || lower.contains("set") {
        "data_access"
    } else {
        "core"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_group_precedence() {
        assert_eq!(module_group("modbus_tcp_init"), "modbus");
        assert_eq!(module_group("tcp_connect"), "network");
        assert_eq!(module_group("rtu_init"), "serial");
        assert_eq!(module_group("ctx_free"), "lifecycle");
        assert_eq!(module_group("get_reg"), "data_access");
        assert_eq!(module_group("FUN_00401000"), "core");
    }

    #[test]
    fn test_purpose_hints() {
        assert_eq!(purpose_hints("buffer_free"), vec!["resource release"]);
        assert!(purpose_hints("FUN_00101234").contains(&"unnamed decompiler function"));
        assert!(purpose_hints("xyz").is_empty());
    }
}
