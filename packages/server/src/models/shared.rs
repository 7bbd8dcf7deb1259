use serde::Serialize;

/// Page position attached to list responses.
#[derive(Serialize, utoipa::ToSchema)]
pub struct Pagination {
    /// 1-based.
    #[schema(example = 2)]
    pub page: u64,
    #[schema(example = 20)]
    pub per_page: u64,
    /// Matching rows over all pages.
    #[schema(example = 31)]
    pub total: u64,
    #[schema(example = 2)]
    pub total_pages: u64,
}
