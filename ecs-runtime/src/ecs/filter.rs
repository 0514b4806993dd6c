// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Filter terms
//!
//! A query key is an ordered list of [`Term`]s combined with AND. Each term
//! names a component (or, under the `resources` key, a resource) type and a
//! predicate over its presence or change history. [`Term::Any`] nests an OR.

use crate::ecs::identity::TypeKey;
use std::fmt;

/// One predicate of a query key
#[derive(Clone, PartialEq, Eq)]
pub enum Term {
    /// The type is present, and its value is extracted
    Read(TypeKey),
    /// The type is present
    Present(TypeKey),
    /// The type is absent
    Absent(TypeKey),
    /// The type was attached after the key's last checkpoint
    Added(TypeKey),
    /// The type was attached or mutated after the key's last checkpoint
    Changed(TypeKey),
    /// The type was present at the last checkpoint and is absent now
    Removed(TypeKey),
    /// Never filters; the value is extracted when present
    Optional(TypeKey),
    /// Matches when any child matches
    Any(Vec<Term>),
}

impl Term {
    /// Bare type reference: requires `T` and extracts its value
    pub fn read<T: 'static>() -> Self {
        Term::Read(TypeKey::of::<T>())
    }

    /// Requires `T` without extracting it
    pub fn present<T: 'static>() -> Self {
        Term::Present(TypeKey::of::<T>())
    }

    /// Requires `T` to be missing
    pub fn absent<T: 'static>() -> Self {
        Term::Absent(TypeKey::of::<T>())
    }

    /// Matches newly attached `T`
    pub fn added<T: 'static>() -> Self {
        Term::Added(TypeKey::of::<T>())
    }

    /// Matches newly attached or mutated `T`
    pub fn changed<T: 'static>() -> Self {
        Term::Changed(TypeKey::of::<T>())
    }

    /// Matches entities that lost `T` since the last checkpoint
    pub fn removed<T: 'static>() -> Self {
        Term::Removed(TypeKey::of::<T>())
    }

    /// Extracts `T` when present, never filters
    pub fn optional<T: 'static>() -> Self {
        Term::Optional(TypeKey::of::<T>())
    }

    /// Logical OR of `terms`
    pub fn any(terms: impl IntoIterator<Item = Term>) -> Self {
        Term::Any(terms.into_iter().collect())
    }

    /// Combine with another term under OR
    ///
    /// ```
    /// use ecs_runtime::ecs::Term;
    ///
    /// struct Velocity;
    /// struct Renderable;
    ///
    /// let term = Term::present::<Velocity>().or(Term::absent::<Renderable>());
    /// assert!(matches!(term, Term::Any(ref children) if children.len() == 2));
    /// ```
    pub fn or(self, other: Term) -> Self {
        match self {
            Term::Any(mut children) => {
                children.push(other);
                Term::Any(children)
            }
            term => Term::Any(vec![term, other]),
        }
    }

    /// Type whose value this term extracts, with whether it may be missing
    pub fn extracted(&self) -> Option<(TypeKey, bool)> {
        match self {
            Term::Read(key) => Some((*key, false)),
            Term::Optional(key) => Some((*key, true)),
            _ => None,
        }
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Read(key) => write!(f, "{key:?}"),
            Term::Present(key) => write!(f, "Present({key:?})"),
            Term::Absent(key) => write!(f, "Absent({key:?})"),
            Term::Added(key) => write!(f, "Added({key:?})"),
            Term::Changed(key) => write!(f, "Changed({key:?})"),
            Term::Removed(key) => write!(f, "Removed({key:?})"),
            Term::Optional(key) => write!(f, "Optional({key:?})"),
            Term::Any(children) => {
                f.write_str("Any")?;
                f.debug_list().entries(children).finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    struct Velocity;
    struct Renderable;

    #[test]
    fn test_or_flattens_into_one_any() {
        let term = Term::present::<Velocity>()
            .or(Term::absent::<Renderable>())
            .or(Term::read::<Position>());
        match term {
            Term::Any(children) => assert_eq!(children.len(), 3),
            other => panic!("expected Any, got {other:?}"),
        }
    }

    #[test]
    fn test_extracted_terms() {
        assert_eq!(
            Term::read::<Position>().extracted(),
            Some((TypeKey::of::<Position>(), false))
        );
        assert_eq!(
            Term::optional::<Position>().extracted(),
            Some((TypeKey::of::<Position>(), true))
        );
        assert_eq!(Term::present::<Position>().extracted(), None);
    }

    #[test]
    fn test_debug_uses_short_names() {
        let term = Term::changed::<Position>().or(Term::absent::<Velocity>());
        assert_eq!(format!("{term:?}"), "Any[Changed(Position), Absent(Velocity)]");
    }
}
