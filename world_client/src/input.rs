//! Input handling.
//!
//! A real front end would feed this from a joystick or keyboard. Here the
//! input surface is a held-state `InputState` plus line commands parsed from
//! a console, both sampled once per frame into a `MotionInput`.

use world_shared::{avatar::EmoteKind, math::Vec2};

/// Held input at a moment in time.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    /// Each axis in `[-1, 1]`; `y` is forward.
    pub direction: Vec2,
    pub sprint: bool,
    /// Horizontal camera angle in radians.
    pub camera_yaw: f32,
    jump_pending: bool,
}

impl InputState {
    pub fn set_direction(&mut self, x: f32, y: f32) {
        self.direction = Vec2::new(x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0));
    }

    /// Registers a jump edge. Consumed by the next `sample`.
    pub fn press_jump(&mut self) {
        self.jump_pending = true;
    }

    /// Samples one frame of input and consumes pending edges.
    pub fn sample(&mut self) -> MotionInput {
        let jump = std::mem::take(&mut self.jump_pending);
        MotionInput {
            direction: self.direction,
            jump,
            sprint: self.sprint,
            camera_yaw: self.camera_yaw,
        }
    }
}

/// Per-frame input to the motion simulator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionInput {
    pub direction: Vec2,
    /// Jump trigger edge.
    pub jump: bool,
    pub sprint: bool,
    pub camera_yaw: f32,
}

impl MotionInput {
    pub fn idle() -> Self {
        Self::default()
    }
}

/// Tic-tac-toe action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardAction {
    Mark(usize),
    Reset,
}

/// A console command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Move { x: f32, y: f32 },
    Stop,
    Jump,
    Sprint(bool),
    Look(f32),
    Sit,
    Emote(EmoteKind),
    Punch,
    Say(String),
    Board(BoardAction),
    Cook,
    Climb,
    Status,
    Quit,
}

impl Command {
    /// Parses one console line. Errors are usage strings.
    pub fn parse(line: &str) -> Result<Command, String> {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((h, r)) => (h, r.trim()),
            None => (line, ""),
        };
        let tokens: Vec<&str> = rest.split_whitespace().collect();

        match head {
            "move" => match tokens.as_slice() {
                [x, y] => {
                    let x = x.parse::<f32>().map_err(|_| "Usage: move <x> <y>".to_string())?;
                    let y = y.parse::<f32>().map_err(|_| "Usage: move <x> <y>".to_string())?;
                    Ok(Command::Move { x, y })
                }
                _ => Err("Usage: move <x> <y>".into()),
            },
            "stop" => Ok(Command::Stop),
            "jump" => Ok(Command::Jump),
            "sprint" => match tokens.as_slice() {
                ["on"] => Ok(Command::Sprint(true)),
                ["off"] => Ok(Command::Sprint(false)),
                _ => Err("Usage: sprint on|off".into()),
            },
            "look" => tokens
                .first()
                .and_then(|t| t.parse::<f32>().ok())
                .map(Command::Look)
                .ok_or_else(|| "Usage: look <radians>".to_string()),
            "sit" => Ok(Command::Sit),
            "emote" => tokens
                .first()
                .and_then(|t| EmoteKind::parse(t))
                .map(Command::Emote)
                .ok_or_else(|| "Usage: emote wave|dance|heart".to_string()),
            "punch" => Ok(Command::Punch),
            "say" if !rest.is_empty() => Ok(Command::Say(rest.to_string())),
            "say" => Err("Usage: say <message>".into()),
            "xo" => match tokens.as_slice() {
                ["reset"] => Ok(Command::Board(BoardAction::Reset)),
                [cell] => cell
                    .parse::<usize>()
                    .map(|c| Command::Board(BoardAction::Mark(c)))
                    .map_err(|_| "Usage: xo <0-8>|reset".to_string()),
                _ => Err("Usage: xo <0-8>|reset".into()),
            },
            "cook" => Ok(Command::Cook),
            "climb" => Ok(Command::Climb),
            "status" => Ok(Command::Status),
            "quit" | "exit" => Ok(Command::Quit),
            "" => Err(String::new()),
            other => Err(format!("Unknown command: {other}")),
        }
    }
}
