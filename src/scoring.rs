//! Lesson scoring.
//!
//! A lesson score weighs the quiz at 70% and the trackable lesson components
//! at 30%. The component set is fixed, so the denominator always matches what
//! can actually be completed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const COMPONENT_WEIGHT: f64 = 0.3;
const QUIZ_WEIGHT: f64 = 0.7;
const POINTS_PER_LEVEL: u32 = 300;

/// Trackable parts of a lesson besides its quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    /// Every section was read.
    Reading,
    /// The lesson's simulation was run.
    Simulation,
    /// The worked exercises were done.
    Exercises,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::Reading, Component::Simulation, Component::Exercises];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Simulation => "simulation",
            Self::Exercises => "exercises",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Component {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown lesson component `{s}`"))
    }
}

/// Last quiz outcome recorded alongside the component flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuizMark {
    /// Percent, 0..=100.
    pub score: u32,
    pub completed_at: DateTime<Utc>,
}

/// The `components_completed` column. Unknown keys written by older clients
/// are ignored on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentSet {
    #[serde(default)]
    reading: bool,
    #[serde(default)]
    simulation: bool,
    #[serde(default)]
    exercises: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quiz: Option<QuizMark>,
}

impl ComponentSet {
    pub fn is_done(&self, component: Component) -> bool {
        match component {
            Component::Reading => self.reading,
            Component::Simulation => self.simulation,
            Component::Exercises => self.exercises,
        }
    }

    pub fn set(&mut self, component: Component, done: bool) {
        match component {
            Component::Reading => self.reading = done,
            Component::Simulation => self.simulation = done,
            Component::Exercises => self.exercises = done,
        }
    }

    pub fn with(mut self, component: Component) -> Self {
        self.set(component, true);
        self
    }

    pub fn completed_count(&self) -> usize {
        Component::ALL.iter().filter(|c| self.is_done(**c)).count()
    }

    pub fn completed(&self) -> impl Iterator<Item = Component> + '_ {
        Component::ALL.into_iter().filter(|c| self.is_done(*c))
    }

    pub fn quiz(&self) -> Option<&QuizMark> {
        self.quiz.as_ref()
    }

    pub fn set_quiz(&mut self, mark: QuizMark) {
        self.quiz = Some(mark);
    }

    /// Union of both sets; the newer quiz mark wins.
    pub fn merge(&self, other: &ComponentSet) -> ComponentSet {
        let quiz = match (self.quiz, other.quiz) {
            (Some(a), Some(b)) => Some(if b.completed_at >= a.completed_at { b } else { a }),
            (a, b) => b.or(a),
        };

        ComponentSet {
            reading: self.reading || other.reading,
            simulation: self.simulation || other.simulation,
            exercises: self.exercises || other.exercises,
            quiz,
        }
    }
}

/// `round(completed/3 * 100 * 0.3 + quiz_percent * 0.7)`; the quiz percent
/// is clamped to 0..=100 and `completed` to the number of components.
pub fn weighted_score(quiz_percent: f64, completed: usize) -> u32 {
    let total = Component::ALL.len();
    let completed = completed.min(total);
    let quiz_percent = if quiz_percent.is_nan() { 0.0 } else { quiz_percent.clamp(0.0, 100.0) };

    let component_score = completed as f64 / total as f64 * 100.0;
    (component_score * COMPONENT_WEIGHT + quiz_percent * QUIZ_WEIGHT).round() as u32
}

pub fn lesson_score(quiz_percent: f64, components: &ComponentSet) -> u32 {
    weighted_score(quiz_percent, components.completed_count())
}

/// Percentage of correct answers, rounded. Zero questions give zero.
pub fn quiz_percentage(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (correct.min(total) as f64 / total as f64 * 100.0).round() as u32
}

/// Share of a lesson's point value earned by a quiz percentage.
pub fn quiz_points(percent: u32, lesson_points: u32) -> u32 {
    (percent.min(100) as f64 / 100.0 * lesson_points as f64).round() as u32
}

pub fn level_for_points(points: u32) -> u32 {
    (points / POINTS_PER_LEVEL).max(1)
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn weights_quiz_and_components() {
        assert_eq!(weighted_score(0.0, 0), 0);
        assert_eq!(weighted_score(100.0, 3), 100);
        assert_eq!(weighted_score(80.0, 0), 56);
        assert_eq!(weighted_score(80.0, 3), 86);
        assert_eq!(weighted_score(50.0, 1), 45);
    }

    #[test]
    fn component_count_is_capped() {
        assert_eq!(weighted_score(100.0, 7), 100);
        assert_eq!(weighted_score(250.0, 3), 100);
        assert_eq!(weighted_score(f64::NAN, 0), 0);
    }

    #[test]
    fn four_of_five_is_eighty_points_of_a_hundred() {
        let percent = quiz_percentage(4, 5);
        assert_eq!(percent, 80);
        assert_eq!(quiz_points(percent, 100), 80);
        assert_eq!(quiz_points(percent, 150), 120);
    }

    #[test]
    fn levels() {
        assert_eq!(level_for_points(0), 1);
        assert_eq!(level_for_points(599), 1);
        assert_eq!(level_for_points(600), 2);
        assert_eq!(level_for_points(2500), 8);
    }

    #[test]
    fn component_set_merge_is_a_union() {
        let a = ComponentSet::default().with(Component::Reading);
        let b = ComponentSet::default().with(Component::Exercises);
        let merged = a.merge(&b);
        assert_eq!(merged.completed_count(), 2);
        assert!(!merged.is_done(Component::Simulation));
    }

    #[test]
    fn legacy_component_keys_are_ignored() {
        let set: ComponentSet = serde_json::from_value(serde_json::json!({
            "reading": true,
            "quiz_completed": true,
            "quiz_score": 80,
        }))
        .unwrap();
        assert_eq!(set.completed_count(), 1);
        assert!(set.quiz().is_none());
    }

    #[test]
    fn component_from_str() {
        assert_eq!("Simulation".parse::<Component>(), Ok(Component::Simulation));
        assert!("quiz".parse::<Component>().is_err());
    }

    proptest! {
        #[test]
        fn matches_formula(q in 0u32..=100, c in 0usize..=3) {
            let expected = (c as f64 / 3.0 * 100.0 * 0.3 + q as f64 * 0.7).round() as u32;
            prop_assert_eq!(weighted_score(q as f64, c), expected);
        }

        #[test]
        fn monotone_in_quiz(q in 0u32..100, c in 0usize..=3) {
            prop_assert!(weighted_score(q as f64, c) <= weighted_score((q + 1) as f64, c));
        }

        #[test]
        fn monotone_in_components(q in 0u32..=100, c in 0usize..3) {
            prop_assert!(weighted_score(q as f64, c) <= weighted_score(q as f64, c + 1));
        }
    }
}
