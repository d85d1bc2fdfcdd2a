//! Built-in content: the daily question pool and static fallbacks that keep the
//! app useful when the text-generation model is unavailable.

use std::collections::BTreeMap;

use crate::domain::{Difficulty, Dimension, MicroChallenge, Touchpoint};

/// Questions per dimension; also the rotation period.
pub const POOL_SIZE: usize = 5;

/// Fixed daily question pool, indexed by rotation index.
pub fn question_pool(dimension: Dimension) -> [&'static str; POOL_SIZE] {
  match dimension {
    Dimension::Emotional => [
      "I handled my emotions well today.",
      "I felt able to bounce back from something stressful today.",
      "I did not suppress or stuff down my feelings today.",
      "I felt emotionally steady for most of today.",
      "I let myself feel what I needed to feel today without judging it.",
    ],
    Dimension::Anxiety => [
      "My mind felt mostly clear and calm today.",
      "I did not spiral into worst-case thinking today.",
      "Anxious thoughts did not take over my day.",
      "I made at least one decision today without excessive second-guessing.",
      "I felt a general sense of safety and okayness today.",
    ],
    Dimension::Spiritual => [
      "I felt connected to something meaningful today.",
      "I noticed a moment of gratitude or awe today.",
      "My actions today felt aligned with what I care about most.",
      "I had a moment of stillness or reflection today.",
      "I felt a sense of purpose in at least one thing I did today.",
    ],
    Dimension::Social => [
      "I felt genuinely connected to at least one person today.",
      "I was honest about how I was feeling in at least one interaction today.",
      "I did not feel lonely or isolated today.",
      "I set or respected a boundary in a relationship today.",
      "I felt seen or understood by someone today.",
    ],
    Dimension::Lifestyle => [
      "I took care of my body today (sleep, food, or movement).",
      "I felt physically energized at some point today.",
      "I balanced doing things with resting appropriately today.",
      "I avoided habits I know drain me today.",
      "My body felt like an ally rather than a source of stress today.",
    ],
  }
}

/// Served when the daily touchpoint cannot be generated.
pub fn fallback_touchpoint() -> Touchpoint {
  Touchpoint {
    affirmation: "You showed up, and that's the whole game.".into(),
    challenge: MicroChallenge {
      title: "Make one brief eye contact".into(),
      description: "During your next interaction, hold eye contact for one extra beat before looking away. Small and specific.".into(),
      difficulty: Difficulty::Easy,
    },
    comfort_zone: "Notice one moment where you wanted to disengage socially, and stay present 30 seconds longer.".into(),
  }
}

/// Per-dimension micro-insight used by the local insight fallback.
pub fn fallback_dimension_insight(dimension: Dimension) -> &'static str {
  match dimension {
    Dimension::Emotional => "Name one feeling out loud today; labelling it takes some of its weight away.",
    Dimension::Anxiety => "When a worry loops, write it down and pick one small next step you control.",
    Dimension::Spiritual => "Take two quiet minutes to notice one thing you are grateful for.",
    Dimension::Social => "Send a short, honest message to someone you trust.",
    Dimension::Lifestyle => "Protect one anchor habit today: a walk, a regular meal or an earlier night.",
  }
}

pub fn fallback_dimension_insights() -> BTreeMap<String, String> {
  Dimension::ALL
    .into_iter()
    .map(|d| (d.id().to_string(), fallback_dimension_insight(d).to_string()))
    .collect()
}

/// Coaching lines used when the simulator cannot reach the model.
pub const SIMULATE_FALLBACKS: [&str; 3] = [
  "That sounds like a lot to carry into this. Take one slow breath, and tell me the very first thing you'd want to say when it starts.",
  "It's completely normal to feel nervous here. What's the smallest version of this situation you could practise first?",
  "Let's slow it down together. What do you imagine the other person is thinking, and what might they actually be thinking?",
];
