// Helper for generating UUIDv7 (timestamp-sortable UUIDs)
//
// PostgreSQL does not natively support UUIDv7 for auto-generation.
// Ledger rows benefit from time-ordering (audit queries scan them in
// issuance order), so we generate UUIDv7 app-side. Tables where
// time-ordering is irrelevant (users, roles) use gen_random_uuid() (v4).

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}
