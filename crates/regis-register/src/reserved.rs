/// Field names that generic writes may not touch.
///
/// These carry ledger meaning (balances, identities, timestamps) and change
/// only through their dedicated operations.
pub const RESERVED_NAMES: &[&str] = &[
    "balance",
    "created",
    "digits",
    "genesis",
    "identifier",
    "modified",
    "owner",
    "stake",
    "supply",
    "system",
    "token",
    "trust",
    "type",
    "version",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}
