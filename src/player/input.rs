use std::marker::PhantomData;

use bevy::ecs::observer::On;
use bevy::prelude::{Component, Deref, DerefMut, EntityEvent, Query, Vec2};
use bevy_enhanced_input::prelude::*;

/// Planar movement axes (forward/back on Y, strafe on X)
#[derive(Debug, InputAction)]
#[action_output(Vec2)]
pub struct MoveAction;

/// Raw mouse motion
#[derive(Debug, InputAction)]
#[action_output(Vec2)]
pub struct LookAction;

/// Jump button
#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct JumpAction;

/// Slide button (held)
#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct SlideAction;

/// Grapple fire button
#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct GrappleAction;

/// Developer noclip toggle
#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct NoClipAction;

/// Press/hold latches for one button-style action.
///
/// `pressed` is an edge: set by the action layer, cleared by the fixed tick
/// that folds it into the command. `held` mirrors the physical button.
#[derive(Component)]
pub struct ActionState<A: InputAction> {
    pub pressed: bool,
    pub held: bool,
    _marker: PhantomData<fn() -> A>,
}

impl<A: InputAction> Default for ActionState<A> {
    fn default() -> Self {
        Self {
            pressed: false,
            held: false,
            _marker: PhantomData,
        }
    }
}

impl<A: InputAction> ActionState<A> {
    /// Reads the press edge and clears it.
    pub fn take_pressed(&mut self) -> bool {
        std::mem::take(&mut self.pressed)
    }
}

/// Latches press and hold for any button action. One observer per action
/// type; jump, slide, grapple, and noclip all share this shape.
pub fn latch_action_press<A: InputAction>(
    trigger: On<Start<A>>,
    mut query: Query<&mut ActionState<A>>,
) {
    let Ok(mut state) = query.get_mut(trigger.event_target()) else {
        return;
    };
    state.pressed = true;
    state.held = true;
}

/// Drops the hold latch when a button action completes.
pub fn release_action_hold<A: InputAction>(
    trigger: On<Complete<A>>,
    mut query: Query<&mut ActionState<A>>,
) {
    let Ok(mut state) = query.get_mut(trigger.event_target()) else {
        return;
    };
    state.held = false;
}

/// Latest move vector reported by the action layer
#[derive(Component, Default, Deref, DerefMut)]
pub struct MoveInput(pub Vec2);

/// Look deltas summed until the next fixed tick drains them
#[derive(Component, Default, Deref, DerefMut)]
pub struct LookInput(pub Vec2);

/// Overwrites the move vector while any movement key is down
pub fn read_move_axes(trigger: On<Fire<MoveAction>>, mut query: Query<&mut MoveInput>) {
    let Ok(mut move_input) = query.get_mut(trigger.event_target()) else {
        return;
    };
    move_input.0 = trigger.value;
}

/// Zeroes the move vector once every movement key is released
pub fn clear_move_axes(trigger: On<Complete<MoveAction>>, mut query: Query<&mut MoveInput>) {
    let Ok(mut move_input) = query.get_mut(trigger.event_target()) else {
        return;
    };
    move_input.0 = Vec2::ZERO;
}

/// Sums look deltas; render frames can outnumber fixed ticks, so the tick
/// consumes the accumulated total rather than the last sample
pub fn accumulate_look_delta(trigger: On<Fire<LookAction>>, mut query: Query<&mut LookInput>) {
    let Ok(mut look_input) = query.get_mut(trigger.event_target()) else {
        return;
    };
    look_input.0 += trigger.value;
}
