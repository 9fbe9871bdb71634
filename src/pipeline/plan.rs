//! Partitions swept by one run and their pagination budget.
//!
//! A plan is plain data: building one does no I/O, and `validate` runs before
//! the first upstream call of every sweep.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use crate::clients::arxiv::{MAX_PAGE_SIZE, SortKey, SortOrder};

/// Name of the coarse single-partition sweep.
pub const ALL_PARTITION: &str = "all";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("category plan has no partitions")]
    Empty,
    #[error("partition {partition}: page size {page_size} is outside 1..={MAX_PAGE_SIZE}")]
    PageSize { partition: String, page_size: usize },
    #[error("partition {partition}: max_pages must be at least 1")]
    MaxPages { partition: String },
    #[error("partition {partition}: max_results must be at least 1")]
    MaxRecords { partition: String },
    #[error("blank category name")]
    BlankCategory,
}

/// 1つのパーティション（カテゴリ）の取得範囲。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    name: String,
    query: String,
    page_size: usize,
    max_pages: usize,
    max_records: Option<usize>,
}

impl Partition {
    fn new(name: impl Into<String>, query: impl Into<String>, page_size: usize, max_pages: usize) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            page_size,
            max_pages,
            max_records: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    #[must_use]
    pub fn max_records(&self) -> Option<usize> {
        self.max_records
    }

    /// Page size to request once `gathered` records are in hand; the last
    /// page of a capped partition asks only for what is still missing.
    #[must_use]
    pub fn request_size(&self, gathered: usize) -> usize {
        self.max_records.map_or(self.page_size, |cap| {
            self.page_size.min(cap.saturating_sub(gathered).max(1))
        })
    }

    /// The configured page budget stays an upper bound.
    fn cap_records(&mut self, max_records: usize) {
        if self.page_size > 0 {
            self.max_pages = self.max_pages.min(max_records.div_ceil(self.page_size));
        }
        self.max_records = Some(max_records);
    }

    fn validate(&self) -> Result<(), PlanError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(PlanError::PageSize {
                partition: self.name.clone(),
                page_size: self.page_size,
            });
        }
        if self.max_records == Some(0) {
            return Err(PlanError::MaxRecords {
                partition: self.name.clone(),
            });
        }
        if self.max_pages == 0 {
            return Err(PlanError::MaxPages {
                partition: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// スイープ対象パーティションの一覧とソート順。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryPlan {
    partitions: Vec<Partition>,
    sort_key: SortKey,
    sort_order: SortOrder,
}

impl CategoryPlan {
    /// 全カテゴリを1パーティションで取得する粗いスイープ。
    #[must_use]
    pub fn all(page_size: usize, max_pages: usize) -> Self {
        Self {
            partitions: vec![Partition::new(ALL_PARTITION, "all", page_size, max_pages)],
            sort_key: SortKey::SubmittedDate,
            sort_order: SortOrder::Descending,
        }
    }

    /// One `cat:<name>` partition per category, in the given order.
    /// Repeated names are swept once.
    ///
    /// # Errors
    /// 空白のみのカテゴリ名が含まれる場合は [`PlanError::BlankCategory`] を返す。
    pub fn categories<I, S>(categories: I, page_size: usize, max_pages: usize) -> Result<Self, PlanError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut partitions = Vec::new();
        for category in categories {
            let category = category.as_ref().trim();
            if category.is_empty() {
                return Err(PlanError::BlankCategory);
            }
            if seen.insert(category.to_string()) {
                partitions.push(Partition::new(
                    category,
                    format!("cat:{category}"),
                    page_size,
                    max_pages,
                ));
            }
        }
        Ok(Self {
            partitions,
            sort_key: SortKey::SubmittedDate,
            sort_order: SortOrder::Descending,
        })
    }

    /// Empty `categories` yields the single "all" partition.
    ///
    /// # Errors
    /// [`CategoryPlan::categories`] と同じ。
    pub fn from_categories(
        categories: &[String],
        page_size: usize,
        max_pages: usize,
    ) -> Result<Self, PlanError> {
        if categories.is_empty() {
            Ok(Self::all(page_size, max_pages))
        } else {
            Self::categories(categories, page_size, max_pages)
        }
    }

    #[must_use]
    pub fn with_sort(mut self, sort_key: SortKey, sort_order: SortOrder) -> Self {
        self.sort_key = sort_key;
        self.sort_order = sort_order;
        self
    }

    /// 各パーティションの取得件数上限を設定する（管理APIの `max_results`）。
    ///
    /// `max_pages` は `ceil(max_results / page_size)` まで縮められるが、設定値を超えることはない。
    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        for partition in &mut self.partitions {
            partition.cap_records(max_results);
        }
        self
    }

    /// # Errors
    /// 最初に見つかった不正なパーティションを [`PlanError`] として返す。
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.partitions.is_empty() {
            return Err(PlanError::Empty);
        }
        self.partitions.iter().try_for_each(Partition::validate)
    }

    #[must_use]
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    #[must_use]
    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    #[must_use]
    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    /// Upper bound on records the plan can fetch.
    #[must_use]
    pub fn requested_count(&self) -> usize {
        self.partitions
            .iter()
            .map(|partition| {
                let paged = partition.page_size.saturating_mul(partition.max_pages);
                partition.max_records.map_or(paged, |cap| cap.min(paged))
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn all_plan_has_single_partition() {
        let plan = CategoryPlan::all(100, 5);
        assert_eq!(plan.partitions().len(), 1);
        assert_eq!(plan.partitions()[0].name(), ALL_PARTITION);
        assert_eq!(plan.requested_count(), 500);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn categories_become_cat_queries_without_repeats() {
        let plan = CategoryPlan::categories(["cs.AI", " cs.LG ", "cs.AI"], 50, 2).expect("plan");
        let queries: Vec<_> = plan.partitions().iter().map(Partition::query).collect();
        assert_eq!(queries, ["cat:cs.AI", "cat:cs.LG"]);
        assert_eq!(plan.requested_count(), 200);
    }

    #[test]
    fn blank_category_is_rejected() {
        let result = CategoryPlan::categories(["cs.AI", "  "], 50, 2);
        assert_eq!(result, Err(PlanError::BlankCategory));
    }

    #[test]
    fn empty_category_list_falls_back_to_all() {
        let plan = CategoryPlan::from_categories(&[], 100, 3).expect("plan");
        assert_eq!(plan.partitions()[0].query(), "all");
    }

    #[test]
    fn empty_plan_is_invalid() {
        let plan = CategoryPlan::categories(Vec::<String>::new(), 100, 1).expect("plan");
        assert_eq!(plan.validate(), Err(PlanError::Empty));
    }

    #[rstest]
    #[case(0)]
    #[case(101)]
    fn page_size_outside_upstream_cap_is_invalid(#[case] page_size: usize) {
        let plan = CategoryPlan::all(page_size, 3);
        assert!(matches!(plan.validate(), Err(PlanError::PageSize { .. })));
    }

    #[test]
    fn zero_max_pages_is_invalid() {
        let plan = CategoryPlan::all(100, 0);
        assert!(matches!(plan.validate(), Err(PlanError::MaxPages { .. })));
    }

    #[rstest]
    #[case(250, 3, 50)]
    #[case(100, 1, 100)]
    #[case(30, 1, 30)]
    fn max_results_derives_page_budget(
        #[case] max_results: usize,
        #[case] max_pages: usize,
        #[case] last_request: usize,
    ) {
        let plan = CategoryPlan::all(100, 10).with_max_results(max_results);
        let partition = &plan.partitions()[0];

        assert_eq!(partition.page_size(), 100);
        assert_eq!(partition.max_pages(), max_pages);
        assert_eq!(partition.max_records(), Some(max_results));
        assert_eq!(partition.request_size((max_pages - 1) * 100), last_request);
        assert_eq!(plan.requested_count(), max_results);
    }

    #[test]
    fn max_results_never_raises_page_budget() {
        let plan = CategoryPlan::all(100, 2).with_max_results(5000);
        let partition = &plan.partitions()[0];

        assert_eq!(partition.max_pages(), 2);
        assert_eq!(plan.requested_count(), 200);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn max_results_does_not_hide_invalid_page_size() {
        let plan = CategoryPlan::all(500, 5).with_max_results(50);
        assert!(matches!(
            plan.validate(),
            Err(PlanError::PageSize { page_size: 500, .. })
        ));
    }

    #[test]
    fn zero_max_results_is_invalid() {
        let plan = CategoryPlan::all(100, 10).with_max_results(0);
        assert!(matches!(plan.validate(), Err(PlanError::MaxRecords { .. })));
    }
}
