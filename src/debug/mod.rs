//! The debug controller: breakpoints, step modes, pause/resume, and frame
//! inspection.
//!
//! The VM consults the controller between instructions, never inside a
//! handler, so a debugger observes inter-instruction states only. In
//! blocking mode the VM thread parks on a condition variable while paused;
//! an external thread inspects the captured stack snapshot and calls
//! `resume`/`step_*` to release it.

use std::path::Path;
use std::sync::{Condvar, Mutex};

/// Step mode for stepping execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepMode {
    #[default]
    None,
    /// Run to the next line in the current frame or above.
    StepOver,
    /// Run to the next line, entering calls.
    StepInto,
    /// Run until the current frame returns.
    StepOut,
}

/// A registered breakpoint.
#[derive(Debug, Clone)]
pub struct Breakpoint {
    pub id: u32,
    pub source_file: String,
    pub line: u32,
    pub enabled: bool,
    pub hit_count: u32,
}

/// A local variable snapshot.
#[derive(Debug, Clone)]
pub struct DebugVariable {
    pub name: String,
    pub value: String,
    pub slot: u16,
}

/// A stack frame snapshot, captured when the VM pauses.
#[derive(Debug, Clone)]
pub struct DebugFrame {
    pub function_name: String,
    pub source_file: String,
    pub line: u32,
    pub frame_index: usize,
    pub locals: Vec<DebugVariable>,
}

#[derive(Default)]
struct DebugState {
    breakpoints: Vec<Breakpoint>,
    next_breakpoint_id: u32,
    step_mode: StepMode,
    step_frame_depth: usize,
    pause_requested: bool,
    paused: bool,
    /// One-shot: after resume, the breakpoint on the current line must not
    /// re-fire until the line counter leaves it.
    skip_breakpoint_on_resume: bool,
    previous_line: u32,
    blocking: bool,
    snapshot: Vec<DebugFrame>,
}

/// The controller shared between the VM thread and a debugger frontend.
#[derive(Default)]
pub struct DebugController {
    state: Mutex<DebugState>,
    resume_cv: Condvar,
    pause_cv: Condvar,
}

impl DebugController {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Breakpoint management ---

    /// Register a breakpoint at a normalized source path and 1-based line.
    pub fn add_breakpoint(&self, source_file: &str, line: u32) -> u32 {
        let mut state = self.state.lock().unwrap();
        state.next_breakpoint_id += 1;
        let id = state.next_breakpoint_id;
        state.breakpoints.push(Breakpoint {
            id,
            source_file: normalize_path(source_file),
            line,
            enabled: true,
            hit_count: 0,
        });
        id
    }

    pub fn remove_breakpoint(&self, id: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        let before = state.breakpoints.len();
        state.breakpoints.retain(|bp| bp.id != id);
        state.breakpoints.len() != before
    }

    pub fn clear_breakpoints(&self) {
        self.state.lock().unwrap().breakpoints.clear();
    }

    /// Replace every breakpoint for one source file (debug-adapter style).
    pub fn set_breakpoints_for_source(&self, source_file: &str, lines: &[u32]) {
        let normalized = normalize_path(source_file);
        let mut state = self.state.lock().unwrap();
        state.breakpoints.retain(|bp| bp.source_file != normalized);
        for line in lines {
            state.next_breakpoint_id += 1;
            let id = state.next_breakpoint_id;
            state.breakpoints.push(Breakpoint {
                id,
                source_file: normalized.clone(),
                line: *line,
                enabled: true,
                hit_count: 0,
            });
        }
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.state.lock().unwrap().breakpoints.clone()
    }

    // --- Execution control ---

    pub fn pause(&self) {
        self.state.lock().unwrap().pause_requested = true;
    }

    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap();
        state.step_mode = StepMode::None;
        state.skip_breakpoint_on_resume = true;
        state.paused = false;
        state.pause_requested = false;
        self.resume_cv.notify_all();
    }

    pub fn step_over(&self) {
        self.release_with(StepMode::StepOver);
    }

    pub fn step_into(&self) {
        self.release_with(StepMode::StepInto);
    }

    pub fn step_out(&self) {
        self.release_with(StepMode::StepOut);
    }

    fn release_with(&self, mode: StepMode) {
        let mut state = self.state.lock().unwrap();
        state.step_mode = mode;
        state.skip_breakpoint_on_resume = true;
        state.paused = false;
        self.resume_cv.notify_all();
    }

    /// Blocking mode parks the VM thread while paused.
    pub fn set_blocking_mode(&self, enabled: bool) {
        self.state.lock().unwrap().blocking = enabled;
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    /// Block the calling (frontend) thread until the VM reports paused.
    pub fn wait_until_paused(&self) {
        let state = self.state.lock().unwrap();
        let _guard = self
            .pause_cv
            .wait_while(state, |s| !s.paused)
            .unwrap();
    }

    // --- Inspection ---

    /// The stack snapshot captured at the current pause, innermost frame
    /// first.
    pub fn stack_trace(&self) -> Vec<DebugFrame> {
        self.state.lock().unwrap().snapshot.clone()
    }

    pub fn locals(&self, frame_index: usize) -> Vec<DebugVariable> {
        self.state
            .lock()
            .unwrap()
            .snapshot
            .iter()
            .find(|f| f.frame_index == frame_index)
            .map(|f| f.locals.clone())
            .unwrap_or_default()
    }

    // --- VM hook ---

    /// Decide whether the VM should pause before the next instruction.
    /// Called on every instruction; the fast path is a single line
    /// comparison.
    pub fn should_pause(&self, line: u32, frame_depth: usize, source_file: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        if line == 0 {
            // No line info: not a pausable site, and not a line transition.
            return false;
        }

        let line_changed = line != state.previous_line;
        if !line_changed && !state.pause_requested && state.step_mode == StepMode::None {
            return false;
        }
        state.previous_line = line;
        if line_changed {
            state.skip_breakpoint_on_resume = false;
        }

        if state.pause_requested {
            state.pause_requested = false;
            state.step_frame_depth = frame_depth;
            return true;
        }

        if !state.skip_breakpoint_on_resume {
            let normalized = normalize_path(source_file);
            let mut hit = false;
            for bp in &mut state.breakpoints {
                if bp.enabled
                    && bp.line == line
                    && (bp.source_file.is_empty() || bp.source_file == normalized)
                {
                    bp.hit_count += 1;
                    hit = true;
                }
            }
            if hit {
                state.step_frame_depth = frame_depth;
                state.step_mode = StepMode::None;
                return true;
            }
        }

        if state.step_mode != StepMode::None && line_changed {
            let should = match state.step_mode {
                StepMode::StepInto => true,
                StepMode::StepOver => frame_depth <= state.step_frame_depth,
                StepMode::StepOut => frame_depth < state.step_frame_depth,
                StepMode::None => false,
            };
            if should {
                state.step_mode = StepMode::None;
                state.step_frame_depth = frame_depth;
                return true;
            }
        }

        false
    }

    /// Record the pause with the VM's stack snapshot; in blocking mode,
    /// park until `resume`/`step_*`.
    pub fn enter_pause(&self, snapshot: Vec<DebugFrame>) {
        let mut state = self.state.lock().unwrap();
        state.paused = true;
        state.snapshot = snapshot;
        let blocking = state.blocking;
        self.pause_cv.notify_all();
        if blocking {
            let _guard = self
                .resume_cv
                .wait_while(state, |s| s.paused)
                .unwrap();
        }
    }
}

/// Normalize a path for breakpoint matching: canonical form when the file
/// exists, with case folding on case-insensitive hosts.
pub fn normalize_path(path: &str) -> String {
    let canonical = std::fs::canonicalize(Path::new(path))
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| path.to_string());
    if cfg!(windows) {
        canonical.to_lowercase()
    } else {
        canonical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoint_fires_on_matching_line() {
        let controller = DebugController::new();
        controller.add_breakpoint("", 3);
        assert!(!controller.should_pause(1, 1, ""));
        assert!(controller.should_pause(3, 1, ""));
    }

    #[test]
    fn test_breakpoint_does_not_refire_until_line_leaves() {
        let controller = DebugController::new();
        controller.add_breakpoint("", 3);
        assert!(controller.should_pause(3, 1, ""));
        controller.enter_pause(Vec::new());
        controller.resume();
        // Still on line 3 after resume: suppressed.
        assert!(!controller.should_pause(3, 1, ""));
        // Leaving and re-entering the line re-arms it.
        assert!(!controller.should_pause(4, 1, ""));
        assert!(controller.should_pause(3, 1, ""));
    }

    #[test]
    fn test_step_over_skips_deeper_frames() {
        let controller = DebugController::new();
        controller.pause();
        assert!(controller.should_pause(1, 1, ""));
        controller.enter_pause(Vec::new());
        controller.step_over();
        // Deeper frame: not a stop.
        assert!(!controller.should_pause(2, 2, ""));
        // Back at the original depth on a new line: stop.
        assert!(controller.should_pause(3, 1, ""));
    }

    #[test]
    fn test_step_out_waits_for_shallower_frame() {
        let controller = DebugController::new();
        controller.pause();
        assert!(controller.should_pause(5, 2, ""));
        controller.enter_pause(Vec::new());
        controller.step_out();
        assert!(!controller.should_pause(6, 2, ""));
        assert!(controller.should_pause(7, 1, ""));
    }

    #[test]
    fn test_remove_breakpoint() {
        let controller = DebugController::new();
        let id = controller.add_breakpoint("", 2);
        assert!(controller.remove_breakpoint(id));
        assert!(!controller.should_pause(2, 1, ""));
    }
}
