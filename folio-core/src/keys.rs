//! Collection names and composite cache keys.
//!
//! Nested entities are namespaced by joining their ids with `_`, so a
//! chapter key embeds its volume and book: `{book}_{volume}_{chapter}`.

/// Cached book records.
pub const BOOKS_CACHE: &str = "books_cache";
/// Cached per-volume heading trees.
pub const HEADINGS_CACHE: &str = "headings_cache";
/// Cached chapter content.
pub const CONTENT_CACHE: &str = "content_cache";
/// Cached search results.
pub const SEARCH_CACHE: &str = "search_cache";
/// Durable queue of pending pin/unpin intents.
pub const PENDING_PIN_OPS: &str = "pending_pin_ops";

/// Key for a book record.
pub fn book_key(book_id: &str) -> String {
    book_id.to_string()
}

/// Key for a volume within a book.
pub fn volume_key(book_id: &str, volume_id: &str) -> String {
    format!("{}_{}", book_id, volume_id)
}

/// Key for a chapter within a volume.
pub fn chapter_key(book_id: &str, volume_id: &str, chapter_id: &str) -> String {
    format!("{}_{}_{}", book_id, volume_id, chapter_id)
}

/// Key for a search-results entry, scoped by language.
pub fn search_key(query: &str, language: &str) -> String {
    format!("{}_{}", language, query)
}
