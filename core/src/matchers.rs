//! Minimal assertion facility used by behavior bodies.
//!
//! `specify` turns a failed match into [`Fault::Mismatch`], which the
//! behavior lifecycle reports as a failure rather than an error.

use crate::outcome::{AssertionDetail, Fault};
use std::fmt::Debug;

pub trait Matcher<T: ?Sized> {
    fn matches(&self, actual: &T) -> bool;

    fn mismatch(&self, actual: &T) -> AssertionDetail;
}

pub fn specify<T, M>(actual: &T, matcher: M) -> Result<(), Fault>
where
    T: ?Sized,
    M: Matcher<T>,
{
    if matcher.matches(actual) {
        Ok(())
    } else {
        Err(Fault::Mismatch(matcher.mismatch(actual)))
    }
}

/// Generic equality; mismatches carry a flat message.
#[derive(Debug, Clone)]
pub struct Equal<E>(E);

pub fn equal<E>(expected: E) -> Equal<E> {
    Equal(expected)
}

impl<T, E> Matcher<T> for Equal<E>
where
    T: PartialEq<E> + Debug + ?Sized,
    E: Debug,
{
    fn matches(&self, actual: &T) -> bool {
        actual == &self.0
    }

    fn mismatch(&self, actual: &T) -> AssertionDetail {
        AssertionDetail::message(format!("expected {:?}, got {:?}", self.0, actual))
    }
}

/// Text equality; mismatches carry both sides for diff rendering.
#[derive(Debug, Clone)]
pub struct EqualText(String);

pub fn equal_text(expected: impl Into<String>) -> EqualText {
    EqualText(expected.into())
}

impl<T> Matcher<T> for EqualText
where
    T: AsRef<str> + ?Sized,
{
    fn matches(&self, actual: &T) -> bool {
        actual.as_ref() == self.0
    }

    fn mismatch(&self, actual: &T) -> AssertionDetail {
        AssertionDetail::comparison(self.0.clone(), actual.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainmentKind {
    /// Same elements with the same multiplicities, any order.
    Exact,
    All,
    Any,
    /// Same elements in the same order.
    InOrder,
    /// Expected elements appear in this relative order, others may be
    /// interleaved.
    InPartialOrder,
}

impl ContainmentKind {
    fn describe(&self) -> &'static str {
        match self {
            ContainmentKind::Exact => "exactly",
            ContainmentKind::All => "all of",
            ContainmentKind::Any => "any of",
            ContainmentKind::InOrder => "in order",
            ContainmentKind::InPartialOrder => "in partial order",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Containment<T> {
    kind: ContainmentKind,
    elements: Vec<T>,
}

impl<T: PartialEq> Containment<T> {
    pub fn new(kind: ContainmentKind, elements: impl IntoIterator<Item = T>) -> Self {
        Self {
            kind,
            elements: elements.into_iter().collect(),
        }
    }

    pub fn kind(&self) -> ContainmentKind {
        self.kind
    }

    pub fn matches_slice(&self, actual: &[T]) -> bool {
        match self.kind {
            ContainmentKind::Exact => exactly(&self.elements, actual),
            ContainmentKind::All => self.elements.iter().all(|item| actual.contains(item)),
            ContainmentKind::Any => self.elements.iter().any(|item| actual.contains(item)),
            ContainmentKind::InOrder => self.elements.as_slice() == actual,
            ContainmentKind::InPartialOrder => {
                let mut remaining = actual.iter();
                self.elements
                    .iter()
                    .all(|item| remaining.any(|candidate| candidate == item))
            }
        }
    }
}

fn exactly<T: PartialEq>(expected: &[T], actual: &[T]) -> bool {
    if expected.len() != actual.len() {
        return false;
    }
    let mut remaining: Vec<&T> = actual.iter().collect();
    for item in expected {
        match remaining.iter().position(|candidate| *candidate == item) {
            Some(index) => {
                remaining.swap_remove(index);
            }
            None => return false,
        }
    }
    remaining.is_empty()
}

impl<T, A> Matcher<A> for Containment<T>
where
    T: PartialEq + Debug,
    A: AsRef<[T]> + ?Sized,
{
    fn matches(&self, actual: &A) -> bool {
        self.matches_slice(actual.as_ref())
    }

    fn mismatch(&self, actual: &A) -> AssertionDetail {
        AssertionDetail::message(format!(
            "expected {} {:?}, got {:?}",
            self.kind.describe(),
            self.elements,
            actual.as_ref()
        ))
    }
}

pub fn contains_exactly<T: PartialEq>(elements: impl IntoIterator<Item = T>) -> Containment<T> {
    Containment::new(ContainmentKind::Exact, elements)
}

pub fn contains_all<T: PartialEq>(elements: impl IntoIterator<Item = T>) -> Containment<T> {
    Containment::new(ContainmentKind::All, elements)
}

pub fn contains_any<T: PartialEq>(elements: impl IntoIterator<Item = T>) -> Containment<T> {
    Containment::new(ContainmentKind::Any, elements)
}

pub fn contains_in_order<T: PartialEq>(elements: impl IntoIterator<Item = T>) -> Containment<T> {
    Containment::new(ContainmentKind::InOrder, elements)
}

pub fn contains_in_partial_order<T: PartialEq>(
    elements: impl IntoIterator<Item = T>,
) -> Containment<T> {
    Containment::new(ContainmentKind::InPartialOrder, elements)
}
