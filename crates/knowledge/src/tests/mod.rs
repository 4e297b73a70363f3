//! Cross-module tests for retrieval ranking and the full ask/ingest pipeline.
