//! Enumerations for TUI state management.

/// Application state for the terminal user interface.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum AppState {
    /// Typing the code of the location to bind this device to.
    LocationCode,
    /// Personal passcode entry for the bound location.
    Login,
    Checklist,
    /// Shared passcode that commits the cart.
    CommitPasscode,
    /// Admin passcode; what it unlocks depends on the pending `AdminPurpose`.
    AdminPasscode,
    EditDescription,
    AddTask,
    PresetPicker,
    Playback,
    Notice,
    Help,
}

/// What an accepted admin passcode is used for.
#[derive(Clone, PartialEq, Debug)]
pub enum AdminPurpose {
    BindLocation(String),
    ResetLocation,
    EditMode,
}
