//! In-memory hold/route index over a local store snapshot
//!
//! Built once with a full scan, then queried without touching the store. Routes
//! keep the store's newest-first order in every result.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use clap::ValueEnum;
use serde::Serialize;

use crate::core::store::LocalStore;
use crate::entities::{Grade, Hold, Route};

/// Lower bound of an open grade window
pub const DEFAULT_MIN_GRADE: f64 = 0.0;

/// Upper bound of an open grade window
pub const DEFAULT_MAX_GRADE: f64 = 100.0;

/// How the holds of a [`RouteQuery`] combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum HoldMatch {
    /// Routes use every hold
    #[default]
    All,
    /// Routes use at least one hold
    Any,
}

/// Ordering applied by [`RouteHoldIndex::filtered_routes`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    /// Creation date
    #[default]
    Date,
    /// IRCRA grade, ungraded routes as `0`
    Grade,
    /// Name, case-insensitive
    Name,
    Ascents,
    Likes,
}

/// Combined filter for [`RouteHoldIndex::filtered_routes`]
#[derive(Debug, Clone)]
pub struct RouteQuery {
    pub hold_ids: Vec<i64>,
    pub hold_match: HoldMatch,
    pub min_grade: Option<f64>,
    pub max_grade: Option<f64>,
    /// Fontainebleau labels, normalized; empty means any
    pub grade_labels: HashSet<String>,
    /// When non-empty, only these setters (by name); takes precedence over `exclude_setters`
    pub include_setters: HashSet<String>,
    pub exclude_setters: HashSet<String>,
    /// Case-insensitive substring of the setter name
    pub setter_contains: Option<String>,
    /// Case-insensitive substring of the route name
    pub name_contains: Option<String>,
    pub feet_rules: HashSet<String>,
    pub sort_by: SortKey,
    pub descending: bool,
}

impl Default for RouteQuery {
    fn default() -> Self {
        Self {
            hold_ids: Vec::new(),
            hold_match: HoldMatch::All,
            min_grade: None,
            max_grade: None,
            grade_labels: HashSet::new(),
            include_setters: HashSet::new(),
            exclude_setters: HashSet::new(),
            setter_contains: None,
            name_contains: None,
            feet_rules: HashSet::new(),
            sort_by: SortKey::Date,
            descending: true,
        }
    }
}

impl RouteQuery {
    pub fn with_holds(mut self, hold_ids: impl IntoIterator<Item = i64>) -> Self {
        self.hold_ids = hold_ids.into_iter().collect();
        self
    }

    pub fn matching_holds(mut self, mode: HoldMatch) -> Self {
        self.hold_match = mode;
        self
    }

    pub fn with_grades(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_grade = min;
        self.max_grade = max;
        self
    }

    pub fn with_grade_labels<S: AsRef<str>>(mut self, labels: impl IntoIterator<Item = S>) -> Self {
        self.grade_labels = labels
            .into_iter()
            .map(|l| Grade::normalize_label(l.as_ref()))
            .collect();
        self
    }

    pub fn including_setters<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.include_setters = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn excluding_setters<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.exclude_setters = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn setter_containing(mut self, text: Option<String>) -> Self {
        self.setter_contains = text.filter(|t| !t.is_empty());
        self
    }

    pub fn name_containing(mut self, text: Option<String>) -> Self {
        self.name_contains = text.filter(|t| !t.is_empty());
        self
    }

    pub fn with_feet_rules<S: Into<String>>(mut self, rules: impl IntoIterator<Item = S>) -> Self {
        self.feet_rules = rules.into_iter().map(Into::into).collect();
        self
    }

    pub fn sorted_by(mut self, key: SortKey, descending: bool) -> Self {
        self.sort_by = key;
        self.descending = descending;
        self
    }
}

/// Setter name with the number of routes they set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetterCount {
    pub name: String,
    pub route_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RouteHoldIndex {
    /// Newest first
    routes: Vec<Route>,
    position: HashMap<String, usize>,
    /// Hold id -> route positions, each route at most once per hold
    hold_to_routes: HashMap<i64, Vec<usize>>,
    /// IRCRA per route position, `0` when ungraded
    route_grade: Vec<f64>,
    setter_to_routes: HashMap<String, Vec<usize>>,
    setters: Vec<SetterCount>,
    holds: HashMap<i64, Hold>,
}

impl RouteHoldIndex {
    /// Index every route and hold in `store`
    pub fn from_store(store: &LocalStore) -> Self {
        let mut index = Self::from_routes(store.get_all_routes());
        index.holds = store
            .get_all_holds(None)
            .into_iter()
            .map(|h| (h.id, h))
            .collect();
        tracing::debug!(
            routes = index.routes.len(),
            holds = index.holds.len(),
            "built route index"
        );
        index
    }

    /// Index routes that are already in newest-first order
    pub fn from_routes(routes: Vec<Route>) -> Self {
        let mut index = Self::default();

        for (pos, route) in routes.iter().enumerate() {
            index.position.insert(route.id.clone(), pos);
            index.route_grade.push(route.ircra());

            for hold in route.holds() {
                let entry = index.hold_to_routes.entry(hold.hold_id).or_default();
                if entry.last() != Some(&pos) {
                    entry.push(pos);
                }
            }

            if let Some(name) = route.setter_name() {
                index
                    .setter_to_routes
                    .entry(name.to_string())
                    .or_default()
                    .push(pos);
            }
        }

        let mut setters: Vec<SetterCount> = index
            .setter_to_routes
            .iter()
            .map(|(name, positions)| SetterCount {
                name: name.clone(),
                route_count: positions.len(),
            })
            .collect();
        setters.sort_by(|a, b| {
            b.route_count
                .cmp(&a.route_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        index.setters = setters;
        index.routes = routes;
        index
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, id: &str) -> Option<&Route> {
        self.position.get(id).map(|&pos| &self.routes[pos])
    }

    /// Hold geometry, when the index was built from a store
    pub fn hold(&self, hold_id: i64) -> Option<&Hold> {
        self.holds.get(&hold_id)
    }

    /// Setters by route count descending, ties by name
    pub fn setters(&self) -> &[SetterCount] {
        &self.setters
    }

    /// IRCRA grade used for range filtering; `0` for ungraded routes
    pub fn route_grade(&self, route_id: &str) -> Option<f64> {
        self.position.get(route_id).map(|&pos| self.route_grade[pos])
    }

    pub fn routes_for_hold(&self, hold_id: i64) -> Vec<&Route> {
        self.hold_to_routes
            .get(&hold_id)
            .map(|positions| positions.iter().map(|&pos| &self.routes[pos]).collect())
            .unwrap_or_default()
    }

    /// Routes using every hold in `hold_ids`; all routes when empty
    pub fn routes_for_holds(&self, hold_ids: &[i64]) -> Vec<&Route> {
        self.collect(self.positions_for_holds(hold_ids))
    }

    /// Routes with `min <= grade <= max`
    pub fn routes_in_grade_range(&self, min: f64, max: f64) -> Vec<&Route> {
        self.collect(
            (0..self.routes.len())
                .filter(|&pos| in_range(self.route_grade[pos], min, max))
                .collect(),
        )
    }

    /// Apply holds, grade window and labels, setter filters, feet rules and name
    /// search, then sort.
    ///
    /// The sort is stable, so routes with equal keys stay newest first.
    pub fn filtered_routes(&self, query: &RouteQuery) -> Vec<&Route> {
        let mut positions = match query.hold_match {
            HoldMatch::All => self.positions_for_holds(&query.hold_ids),
            HoldMatch::Any => self.positions_for_any_hold(&query.hold_ids),
        };

        if query.min_grade.is_some() || query.max_grade.is_some() {
            let (min, max) = grade_window(query.min_grade, query.max_grade);
            positions.retain(|&pos| in_range(self.route_grade[pos], min, max));
        }

        if !query.grade_labels.is_empty() {
            positions.retain(|&pos| {
                self.routes[pos]
                    .grade
                    .as_ref()
                    .is_some_and(|g| query.grade_labels.contains(&g.font))
            });
        }

        if !query.include_setters.is_empty() {
            positions.retain(|&pos| {
                self.routes[pos]
                    .setter_name()
                    .is_some_and(|name| query.include_setters.contains(name))
            });
        } else if !query.exclude_setters.is_empty() {
            positions.retain(|&pos| {
                self.routes[pos]
                    .setter_name()
                    .map_or(true, |name| !query.exclude_setters.contains(name))
            });
        }

        if let Some(text) = &query.setter_contains {
            let needle = text.to_lowercase();
            positions.retain(|&pos| {
                self.routes[pos]
                    .setter_name()
                    .is_some_and(|name| name.to_lowercase().contains(&needle))
            });
        }

        if !query.feet_rules.is_empty() {
            positions.retain(|&pos| {
                self.routes[pos]
                    .feet_rule
                    .as_ref()
                    .is_some_and(|rule| query.feet_rules.contains(rule))
            });
        }

        if let Some(text) = &query.name_contains {
            let needle = text.to_lowercase();
            positions.retain(|&pos| self.routes[pos].name.to_lowercase().contains(&needle));
        }

        positions.sort_by(|&a, &b| {
            let ord = self.compare(a, b, query.sort_by);
            if query.descending {
                ord.reverse()
            } else {
                ord
            }
        });
        self.collect(positions)
    }

    /// Easiest grade among routes on `hold_id` inside the window
    pub fn hold_min_grade(
        &self,
        hold_id: i64,
        min: Option<f64>,
        max: Option<f64>,
        valid_route_ids: Option<&HashSet<String>>,
    ) -> Option<f64> {
        self.hold_grades(hold_id, min, max, valid_route_ids)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Hardest grade among routes on `hold_id` inside the window
    pub fn hold_max_grade(
        &self,
        hold_id: i64,
        min: Option<f64>,
        max: Option<f64>,
        valid_route_ids: Option<&HashSet<String>>,
    ) -> Option<f64> {
        self.hold_grades(hold_id, min, max, valid_route_ids)
            .max_by(|a, b| a.total_cmp(b))
    }

    /// Number of routes in the grade window using each hold; unused holds are omitted
    pub fn holds_usage(&self, min: Option<f64>, max: Option<f64>) -> HashMap<i64, usize> {
        if min.is_none() && max.is_none() {
            return self.usage_where(|_| true);
        }
        let (min, max) = grade_window(min, max);
        self.usage_where(|pos| in_range(self.route_grade[pos], min, max))
    }

    /// Usage rank of each hold in `0.0..=1.0`.
    ///
    /// Ties share their average rank, divided by `n - 1` over the `n` used holds;
    /// a single used hold sits at `0.5`. When `valid_route_ids` is given it
    /// replaces the grade window.
    pub fn holds_usage_percentile(
        &self,
        min: Option<f64>,
        max: Option<f64>,
        valid_route_ids: Option<&HashSet<String>>,
    ) -> HashMap<i64, f64> {
        let usage = match valid_route_ids {
            Some(valid) => self.usage_where(|pos| valid.contains(&self.routes[pos].id)),
            None => self.holds_usage(min, max),
        };
        if usage.is_empty() {
            return HashMap::new();
        }

        let mut counts: Vec<usize> = usage.values().copied().collect();
        counts.sort_unstable();
        let n = counts.len();

        let mut percentile_of: HashMap<usize, f64> = HashMap::new();
        let mut i = 0;
        while i < n {
            let mut j = i;
            while j < n && counts[j] == counts[i] {
                j += 1;
            }
            let avg_rank = (i + j - 1) as f64 / 2.0;
            let percentile = if n > 1 { avg_rank / (n - 1) as f64 } else { 0.5 };
            percentile_of.insert(counts[i], percentile);
            i = j;
        }

        usage
            .into_iter()
            .map(|(hold_id, count)| (hold_id, percentile_of[&count]))
            .collect()
    }

    fn positions_for_holds(&self, hold_ids: &[i64]) -> Vec<usize> {
        let mut wanted = hold_ids.iter();
        let Some(first) = wanted.next() else {
            return (0..self.routes.len()).collect();
        };

        let mut matching: BTreeSet<usize> = self
            .hold_to_routes
            .get(first)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default();
        for hold_id in wanted {
            if matching.is_empty() {
                break;
            }
            let on_hold: HashSet<usize> = self
                .hold_to_routes
                .get(hold_id)
                .map(|p| p.iter().copied().collect())
                .unwrap_or_default();
            matching.retain(|pos| on_hold.contains(pos));
        }
        matching.into_iter().collect()
    }

    fn positions_for_any_hold(&self, hold_ids: &[i64]) -> Vec<usize> {
        if hold_ids.is_empty() {
            return (0..self.routes.len()).collect();
        }
        let matching: BTreeSet<usize> = hold_ids
            .iter()
            .filter_map(|id| self.hold_to_routes.get(id))
            .flatten()
            .copied()
            .collect();
        matching.into_iter().collect()
    }

    fn compare(&self, a: usize, b: usize, key: SortKey) -> Ordering {
        let (ra, rb) = (&self.routes[a], &self.routes[b]);
        match key {
            SortKey::Date => ra.created_at.cmp(&rb.created_at),
            SortKey::Grade => self.route_grade[a].total_cmp(&self.route_grade[b]),
            SortKey::Name => ra.name.to_lowercase().cmp(&rb.name.to_lowercase()),
            SortKey::Ascents => ra.ascents.cmp(&rb.ascents),
            SortKey::Likes => ra.likes.cmp(&rb.likes),
        }
    }

    fn hold_grades<'s>(
        &'s self,
        hold_id: i64,
        min: Option<f64>,
        max: Option<f64>,
        valid_route_ids: Option<&'s HashSet<String>>,
    ) -> impl Iterator<Item = f64> + 's {
        let (min, max) = grade_window(min, max);
        self.hold_to_routes
            .get(&hold_id)
            .into_iter()
            .flatten()
            .filter(move |&&pos| {
                valid_route_ids.map_or(true, |valid| valid.contains(&self.routes[pos].id))
            })
            .map(|&pos| self.route_grade[pos])
            .filter(move |&grade| in_range(grade, min, max))
    }

    fn usage_where(&self, keep: impl Fn(usize) -> bool) -> HashMap<i64, usize> {
        self.hold_to_routes
            .iter()
            .filter_map(|(&hold_id, positions)| {
                let count = positions.iter().filter(|&&pos| keep(pos)).count();
                (count > 0).then_some((hold_id, count))
            })
            .collect()
    }

    fn collect(&self, positions: Vec<usize>) -> Vec<&Route> {
        positions.into_iter().map(|pos| &self.routes[pos]).collect()
    }
}

fn grade_window(min: Option<f64>, max: Option<f64>) -> (f64, f64) {
    (
        min.unwrap_or(DEFAULT_MIN_GRADE),
        max.unwrap_or(DEFAULT_MAX_GRADE),
    )
}

fn in_range(grade: f64, min: f64, max: f64) -> bool {
    min <= grade && grade <= max
}
