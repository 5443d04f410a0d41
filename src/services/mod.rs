//! Business services behind the HTTP handlers. Each service owns one part of
//! the domain and talks to the database through sea-orm.

pub mod accounts;
pub mod catalog;
pub mod customers;
pub mod dashboard;
pub mod menus;
pub mod orders;
pub mod seed;

use sea_orm::sea_query::{Expr, Func, IntoColumnRef, LikeExpr, SimpleExpr};

const LIKE_ESCAPE: char = '\\';

/// Escapes LIKE wildcards so user input only ever matches literally.
pub(crate) fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(ch);
    }
    escaped
}

/// `lower(column) LIKE '%term%'` with the term lowercased and escaped.
pub(crate) fn contains_ignore_case(column: impl IntoColumnRef, term: &str) -> SimpleExpr {
    let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
    Expr::expr(Func::lower(Expr::col(column)))
        .like(LikeExpr::new(pattern).escape(LIKE_ESCAPE))
}

/// `column LIKE '%term%'`, case handling left to the backend collation.
pub(crate) fn contains(column: impl IntoColumnRef, term: &str) -> SimpleExpr {
    let pattern = format!("%{}%", escape_like(term));
    Expr::col(column).like(LikeExpr::new(pattern).escape(LIKE_ESCAPE))
}

/// Trims a search term, treating blank input as no term at all.
pub(crate) fn search_term(term: Option<&str>) -> Option<&str> {
    term.map(str::trim).filter(|t| !t.is_empty())
}

/// Clamps a requested page to the first page and a page size to at least one.
pub(crate) fn page_window(page: u64, page_size: u64) -> (u64, u64) {
    (page.max(1), page_size.max(1))
}
