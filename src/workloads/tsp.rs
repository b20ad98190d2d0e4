//! Travelling salesman by branch and bound.
//!
//! Tours start and end at city 0. The top levels of the search tree are
//! distributed, one child per next city; below `split_depth` a task finishes
//! its subtree with a local depth-first search. Every improved tour is
//! broadcast as a [`TourBound`] so other machines can prune against it.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::task::{Decomposition, Shared, Task, TaskContext};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub x: f64,
    pub y: f64,
}

impl City {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &City) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Best closed tour length known so far. Shorter is newer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TourBound(pub f64);

impl TourBound {
    pub fn new(length: f64) -> Self {
        Self(length)
    }

    pub fn length(&self) -> f64 {
        self.0
    }
}

impl Default for TourBound {
    fn default() -> Self {
        Self(f64::INFINITY)
    }
}

impl Shared for TourBound {
    fn is_newer_than(&self, other: &Self) -> bool {
        self.0 < other.0
    }
}

/// A closed tour, listed from city 0 without repeating it at the end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tour {
    pub route: Vec<usize>,
    pub length: f64,
}

#[derive(Debug, Clone)]
pub struct TspTask {
    cities: Arc<[City]>,
    route: Vec<usize>,
    remaining: Vec<usize>,
    length: f64,
    split_depth: usize,
}

impl TspTask {
    /// Number of route cities below which the search is split across tasks
    pub const DEFAULT_SPLIT_DEPTH: usize = 5;

    pub fn new(cities: Vec<City>) -> Self {
        Self::with_split_depth(cities, Self::DEFAULT_SPLIT_DEPTH)
    }

    pub fn with_split_depth(cities: Vec<City>, split_depth: usize) -> Self {
        let remaining = (1..cities.len()).collect();
        Self {
            cities: cities.into(),
            route: vec![0],
            remaining,
            length: 0.0,
            split_depth,
        }
    }

    pub fn route(&self) -> &[usize] {
        &self.route
    }

    fn last(&self) -> usize {
        self.route.last().copied().unwrap_or(0)
    }

    fn dist(&self, a: usize, b: usize) -> f64 {
        self.cities[a].distance(&self.cities[b])
    }

    /// No tour extending this route is shorter
    fn lower_bound(&self) -> f64 {
        self.length + self.completion_bound(self.last(), &self.remaining)
    }

    /// Cheapest possible way from `last` through every city in `remaining`
    /// back to city 0. Each remaining city must be left by some edge to
    /// another remaining city or home, and `last` must be left towards a
    /// remaining city, so the sum of those cheapest edges never exceeds
    /// the real completion.
    fn completion_bound(&self, last: usize, remaining: &[usize]) -> f64 {
        if remaining.is_empty() {
            return self.dist(last, 0);
        }
        let leave_last = remaining
            .iter()
            .map(|&c| self.dist(last, c))
            .fold(f64::INFINITY, f64::min);
        let leave_each: f64 = remaining
            .iter()
            .map(|&from| {
                remaining
                    .iter()
                    .filter(|&&to| to != from)
                    .chain(std::iter::once(&0))
                    .map(|&to| self.dist(from, to))
                    .fold(f64::INFINITY, f64::min)
            })
            .sum();
        leave_last + leave_each
    }

    fn splits(&self) -> bool {
        !self.remaining.is_empty() && self.route.len() < self.split_depth
    }

    fn extend(&self, next: usize) -> Self {
        let mut route = self.route.clone();
        route.push(next);
        Self {
            cities: Arc::clone(&self.cities),
            route,
            remaining: self.remaining.iter().copied().filter(|&c| c != next).collect(),
            length: self.length + self.dist(self.last(), next),
            split_depth: self.split_depth,
        }
    }

    /// Depth-first search of the rest of the subtree, pruning against the
    /// local best and the machine's shared bound
    fn solve_locally(&self, ctx: &TaskContext<TourBound>) -> Option<Tour> {
        let mut best: Option<Tour> = None;
        let mut route = self.route.clone();
        let mut remaining = self.remaining.clone();
        self.search(&mut route, &mut remaining, self.length, &mut best, ctx);
        best
    }

    fn search(
        &self,
        route: &mut Vec<usize>,
        remaining: &mut Vec<usize>,
        length: f64,
        best: &mut Option<Tour>,
        ctx: &TaskContext<TourBound>,
    ) {
        let last = route.last().copied().unwrap_or(0);
        let limit = best
            .as_ref()
            .map_or(ctx.shared().length(), |tour| tour.length.min(ctx.shared().length()));
        if length + self.completion_bound(last, remaining) > limit {
            return;
        }

        if remaining.is_empty() {
            let closed = length + self.dist(last, 0);
            if best.as_ref().map_or(true, |tour| closed < tour.length) {
                *best = Some(Tour {
                    route: route.clone(),
                    length: closed,
                });
                ctx.broadcast(TourBound::new(closed));
            }
            return;
        }

        for i in 0..remaining.len() {
            let next = remaining.swap_remove(i);
            route.push(next);
            self.search(route, remaining, length + self.dist(last, next), best, ctx);
            route.pop();
            remaining.push(next);
            let end = remaining.len() - 1;
            remaining.swap(i, end);
        }
    }
}

impl Task for TspTask {
    type Value = Tour;
    type Shared = TourBound;

    fn decomposition_size(&self) -> usize {
        self.remaining.len()
    }

    fn decompose(&self, ctx: &TaskContext<TourBound>) -> Decomposition<Self> {
        if self.lower_bound() > ctx.shared().length() {
            return Decomposition::Pruned;
        }
        if self.splits() {
            return Decomposition::Split(self.remaining.iter().map(|&c| self.extend(c)).collect());
        }
        match self.solve_locally(ctx) {
            Some(tour) => Decomposition::Value(tour),
            None => Decomposition::Pruned,
        }
    }

    fn compose(&self, values: Vec<Tour>, _ctx: &TaskContext<TourBound>) -> Option<Tour> {
        values
            .into_iter()
            .min_by(|a, b| a.length.total_cmp(&b.length))
    }

    fn space_runnable(&self) -> bool {
        true
    }
}
