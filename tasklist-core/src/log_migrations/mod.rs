//! Event log schema, embedded at build time
//!
//! Entries are `(name, sql)` and are applied in the order listed. The first
//! entry creates the bookkeeping table and is applied before anything else.
//! New migrations get the next `NNN_` prefix and are appended here.

pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
