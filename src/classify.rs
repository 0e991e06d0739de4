//! Lexical link classification.
//!
//! Purely pattern/keyword based — no HTML structure or position signal. The
//! category check runs before the product check, so a URL matching both (e.g.
//! `/shop/products/x`) always classifies as a category.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Category,
    Product,
    Other,
}

// ---------------------------------------------------------------------------
// Pattern tables
// ---------------------------------------------------------------------------

const CATEGORY_PATH_PATTERNS: &[&str] = &[
    "/collections/",
    "/collection/",
    "/category/",
    "/categories/",
    "/shop/",
    "/browse/",
    "/men/",
    "/women/",
    "/kids/",
    "/sale/",
];

const CATEGORY_KEYWORDS: &[&str] = &[
    "collection",
    "collections",
    "category",
    "categories",
    "shop",
    "browse",
    "men",
    "women",
    "kids",
    "apparel",
    "clothing",
    "accessories",
    "electronics",
    "furniture",
    "beauty",
    "outdoor",
    "sale",
    "bestsellers",
    "new arrivals",
];

const PRODUCT_PATH_PATTERNS: &[&str] = &[
    "/products/",
    "/product/",
    "/item/",
    "/items/",
    "/p/",
    "/dp/",
];

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Short keywords must match whole words so "men" does not fire on "women"
/// or "payment"; longer keywords use plain substring matching.
fn keyword_match(text: &str, keyword: &str) -> bool {
    if keyword.len() >= 4 {
        text.contains(keyword)
    } else {
        text.split(|c: char| !c.is_alphanumeric())
            .any(|word| word == keyword)
    }
}

/// Classify a link from its URL and anchor text. First match wins; ties are
/// impossible because the category check precedes the product check.
pub fn classify(url: &str, text: &str) -> LinkKind {
    let url_lower = url.to_lowercase();
    let text_lower = text.to_lowercase();

    if CATEGORY_PATH_PATTERNS.iter().any(|p| url_lower.contains(p))
        || CATEGORY_KEYWORDS
            .iter()
            .any(|k| keyword_match(&text_lower, k) || keyword_match(&url_lower, k))
    {
        return LinkKind::Category;
    }

    if PRODUCT_PATH_PATTERNS.iter().any(|p| url_lower.contains(p)) {
        return LinkKind::Product;
    }

    LinkKind::Other
}
