//! Audit logging: the sink seam plus the append-only JSONL activity log.

pub mod jsonl;
pub mod sink;
