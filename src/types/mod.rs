pub mod domain;

pub use domain::*;

/// 一次仓库列表查询的结果，按所有者分组
pub type RepositoryListing = Vec<RepositoryGroup>;
