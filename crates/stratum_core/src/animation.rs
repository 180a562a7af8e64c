//! Animation scripts.
//!
//! An animation is a looping list of [`AnimStep`]s. Besides picking sprite
//! frames, scripts carry gameplay-relevant markers: the `Attack` action
//! point (when the blow lands), and `Unbreakable` brackets during which the
//! order logic must not interrupt the unit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rng::SyncRng;
use crate::unit_type::UnitTypeId;

/// One instruction of an animation script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimStep {
    /// Show a sprite frame.
    Frame(u16),
    /// Hold for this many ticks.
    Wait(u32),
    /// Hold for a synchronized random number of ticks in `min..=max`.
    RandomWait(u32, u32),
    /// Action point: the attack (or repair/build work) happens now.
    Attack,
    /// Enter or leave an uninterruptible section.
    Unbreakable(bool),
    /// Play a named sound.
    Sound(String),
}

/// A looping animation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnimationScript {
    /// Steps, executed in order and wrapping around.
    pub steps: Vec<AnimStep>,
}

/// Which animation of a unit type is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimationKind {
    /// Standing around.
    Still,
    /// Walking one step.
    Move,
    /// Attacking.
    Attack,
    /// Repairing.
    Repair,
    /// Constructing.
    Build,
    /// Dying.
    Death,
}

/// All animations of a unit type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationSet {
    /// Idle animation.
    pub still: Option<AnimationScript>,
    /// Movement animation.
    pub moving: Option<AnimationScript>,
    /// Attack animation.
    pub attack: Option<AnimationScript>,
    /// Repair animation.
    pub repair: Option<AnimationScript>,
    /// Build animation.
    pub build: Option<AnimationScript>,
    /// Death animations keyed by damage kind.
    pub death: BTreeMap<String, AnimationScript>,
    /// Death animation for any other damage kind.
    pub death_default: Option<AnimationScript>,
}

impl AnimationSet {
    /// Script for `kind`, or `None` if the type has none.
    ///
    /// Death looks up `damage_kind` first and falls back to the generic script.
    #[must_use]
    pub fn script(&self, kind: AnimationKind, damage_kind: Option<&str>) -> Option<&AnimationScript> {
        let script = match kind {
            AnimationKind::Still => self.still.as_ref(),
            AnimationKind::Move => self.moving.as_ref(),
            AnimationKind::Attack => self.attack.as_ref(),
            AnimationKind::Repair => self.repair.as_ref(),
            AnimationKind::Build => self.build.as_ref(),
            AnimationKind::Death => damage_kind
                .and_then(|k| self.death.get(k))
                .or(self.death_default.as_ref()),
        };
        script.filter(|s| !s.steps.is_empty())
    }
}

/// Identity of a running animation: a type change restarts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnimKey {
    /// Unit type the script belongs to.
    pub unit_type: UnitTypeId,
    /// Animation kind.
    pub kind: AnimationKind,
}

/// Playback position of a unit's animation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnimState {
    /// Animation currently playing.
    pub key: Option<AnimKey>,
    /// Index of the next step.
    pub step: u16,
    /// Remaining ticks of the current hold.
    pub wait: u32,
    /// Inside an uninterruptible section.
    pub unbreakable: bool,
}

/// What happened while advancing an animation by one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnimOutcome {
    /// An action point was passed.
    pub action: bool,
    /// Sounds requested by the script.
    pub sounds: Vec<String>,
}

/// Advance `state` by one tick of `script`.
///
/// Steps execute until a hold is reached; each full pass over the script is
/// bounded so a script without holds cannot spin.
pub fn show_animation(
    state: &mut AnimState,
    frame: &mut u16,
    key: AnimKey,
    script: &AnimationScript,
    rng: &mut SyncRng,
) -> AnimOutcome {
    let mut outcome = AnimOutcome::default();
    let len = script.steps.len();
    if len == 0 {
        return outcome;
    }

    if state.key != Some(key) {
        state.key = Some(key);
        state.step = 0;
        state.wait = 0;
    }
    if usize::from(state.step) >= len {
        state.step = 0;
    }

    if state.wait > 0 {
        state.wait -= 1;
        if state.wait == 0 {
            state.step = ((usize::from(state.step) + 1) % len) as u16;
        }
        return outcome;
    }

    for _ in 0..len {
        let hold = match &script.steps[usize::from(state.step)] {
            AnimStep::Frame(f) => {
                *frame = *f;
                0
            }
            AnimStep::Wait(ticks) => *ticks,
            AnimStep::RandomWait(min, max) => {
                let (lo, hi) = if min <= max { (*min, *max) } else { (*max, *min) };
                lo + rng.range(hi - lo + 1)
            }
            AnimStep::Attack => {
                outcome.action = true;
                0
            }
            AnimStep::Unbreakable(on) => {
                state.unbreakable = *on;
                0
            }
            AnimStep::Sound(name) => {
                outcome.sounds.push(name.clone());
                0
            }
        };

        if hold > 0 {
            // The current tick counts as the first tick of the hold.
            state.wait = hold - 1;
            if state.wait == 0 {
                state.step = ((usize::from(state.step) + 1) % len) as u16;
            }
            break;
        }
        state.step = ((usize::from(state.step) + 1) % len) as u16;
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(kind: AnimationKind) -> AnimKey {
        AnimKey {
            unit_type: UnitTypeId(0),
            kind,
        }
    }

    #[test]
    fn test_attack_action_point_fires_once_per_cycle() {
        let script = AnimationScript {
            steps: vec![AnimStep::Frame(1), AnimStep::Wait(2), AnimStep::Attack, AnimStep::Wait(2)],
        };
        let mut state = AnimState::default();
        let mut frame = 0;
        let mut rng = SyncRng::new(0);
        let fired: Vec<bool> = (0..8)
            .map(|_| show_animation(&mut state, &mut frame, key(AnimationKind::Attack), &script, &mut rng).action)
            .collect();
        assert_eq!(fired, vec![false, false, true, false, false, false, true, false]);
        assert_eq!(frame, 1);
    }

    #[test]
    fn test_unbreakable_bracket() {
        let script = AnimationScript {
            steps: vec![
                AnimStep::Unbreakable(true),
                AnimStep::Wait(3),
                AnimStep::Unbreakable(false),
                AnimStep::Wait(1),
            ],
        };
        let mut state = AnimState::default();
        let mut frame = 0;
        let mut rng = SyncRng::new(0);
        let k = key(AnimationKind::Death);
        let flags: Vec<bool> = (0..4)
            .map(|_| {
                show_animation(&mut state, &mut frame, k, &script, &mut rng);
                state.unbreakable
            })
            .collect();
        assert_eq!(flags, vec![true, true, true, false]);
    }

    #[test]
    fn test_changing_key_restarts() {
        let script = AnimationScript {
            steps: vec![AnimStep::Frame(3), AnimStep::Wait(5), AnimStep::Frame(4), AnimStep::Wait(5)],
        };
        let mut state = AnimState::default();
        let mut frame = 0;
        let mut rng = SyncRng::new(0);
        show_animation(&mut state, &mut frame, key(AnimationKind::Still), &script, &mut rng);
        let other = AnimKey {
            unit_type: UnitTypeId(1),
            kind: AnimationKind::Still,
        };
        show_animation(&mut state, &mut frame, other, &script, &mut rng);
        assert_eq!(state.key, Some(other));
        assert_eq!(frame, 3);
        assert_eq!(state.wait, 4);
    }

    #[test]
    fn test_script_without_holds_terminates() {
        let script = AnimationScript {
            steps: vec![AnimStep::Frame(1), AnimStep::Attack],
        };
        let mut state = AnimState::default();
        let mut frame = 0;
        let mut rng = SyncRng::new(0);
        let outcome = show_animation(&mut state, &mut frame, key(AnimationKind::Attack), &script, &mut rng);
        assert!(outcome.action);
    }

    #[test]
    fn test_death_falls_back_to_generic() {
        let mut set = AnimationSet::default();
        set.death_default = Some(AnimationScript {
            steps: vec![AnimStep::Wait(1)],
        });
        assert!(set.script(AnimationKind::Death, Some("fire")).is_some());
        assert!(set.script(AnimationKind::Attack, None).is_none());
    }
}
