use redb::TableDefinition;

/// Identifier records: insertion sequence -> Identifier (msgpack)
pub const IDENTIFIERS: TableDefinition<u64, &[u8]> = TableDefinition::new("identifiers");

/// Unique index: identifier value -> insertion sequence
pub const IDENTIFIER_VALUES: TableDefinition<&str, u64> =
    TableDefinition::new("identifier_values");

/// Unique index: holder -> insertion sequence (a client holds at most one identifier)
pub const HOLDERS: TableDefinition<&str, u64> = TableDefinition::new("holders");

/// Free list, ordered by insertion sequence so claims are first-in first-out
pub const FREE_IDENTIFIERS: TableDefinition<u64, ()> = TableDefinition::new("free_identifiers");

/// Renewal index: (last_renewed_at in microseconds, insertion sequence)
pub const RENEWALS: TableDefinition<(i64, u64), ()> = TableDefinition::new("renewals");
