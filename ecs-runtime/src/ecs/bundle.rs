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
//! Bundles: reusable groups of components
//!
//! A bundle has no runtime representation; it is a fixed sequence of
//! component attachments. Tuples of components are bundles, and named
//! bundles are plain structs implementing [`Bundle`] by hand.

use crate::ecs::command::BoxedComponent;
use crate::ecs::Component;

/// A fixed set of components attached together
///
/// # Examples
///
/// ```
/// use ecs_runtime::ecs::{Bundle, BoxedComponent, Component};
///
/// #[derive(Default)]
/// struct Position { x: f64 }
/// impl Component for Position {}
///
/// #[derive(Default)]
/// struct Health(u32);
/// impl Component for Health {}
///
/// struct PlayerBundle { position: Position, health: Health }
///
/// impl Bundle for PlayerBundle {
///     fn into_components(self, out: &mut Vec<BoxedComponent>) {
///         (self.position, self.health).into_components(out);
///     }
/// }
/// ```
pub trait Bundle: 'static {
    /// Push every component of this bundle, in attachment order
    fn into_components(self, out: &mut Vec<BoxedComponent>);

    /// Collect the components into a fresh vector
    fn into_boxed(self) -> Vec<BoxedComponent>
    where
        Self: Sized,
    {
        let mut out = Vec::new();
        self.into_components(&mut out);
        out
    }
}

impl Bundle for () {
    fn into_components(self, _out: &mut Vec<BoxedComponent>) {}
}

macro_rules! tuple_bundle {
    ($($name:ident),+) => {
        impl<$($name: Component),+> Bundle for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_components(self, out: &mut Vec<BoxedComponent>) {
                let ($($name,)+) = self;
                $(out.push(BoxedComponent::new($name));)+
            }
        }
    };
}

tuple_bundle!(A);
tuple_bundle!(A, B);
tuple_bundle!(A, B, C);
tuple_bundle!(A, B, C, D);
tuple_bundle!(A, B, C, D, E);
tuple_bundle!(A, B, C, D, E, F);
tuple_bundle!(A, B, C, D, E, F, G);
tuple_bundle!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    impl Component for Position {}

    struct Velocity;
    impl Component for Velocity {}

    #[test]
    fn test_tuple_bundle_keeps_order() {
        let boxed = (Position, Velocity).into_boxed();
        let names: Vec<&str> = boxed.iter().map(|c| c.type_key().short_name()).collect();
        assert_eq!(names, vec!["Position", "Velocity"]);
    }

    #[test]
    fn test_empty_bundle() {
        assert!(().into_boxed().is_empty());
    }
}
