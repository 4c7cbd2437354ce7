//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{AuxData, LessonRef};
use crate::error::EngineError;
use crate::games::{ChallengeKind, Game, GameKind};
use crate::machine::{ChallengeStageMachine, MachineState, SubmitOutcome};
use crate::progress::{CompletionAward, CourseView};
use crate::xp::{LevelChange, UserSnapshot};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientWsMessage {
    Ping,
    Courses { user_id: String },
    CompleteLesson { user_id: String, course_id: String, topic_id: String, lesson_id: String },
    StartLesson { user_id: String, course_id: String, topic_id: String, lesson_id: String },
    SubmitLesson { user_id: String, course_id: String, topic_id: String, lesson_id: String, code: String },
    LessonHint { user_id: String, course_id: String, topic_id: String, lesson_id: String },
    User { user_id: String },
    Games,
    StartSession { user_id: String, game_id: String },
    Submit { user_id: String, game_id: String, code: String },
    Hint { user_id: String, game_id: String },
    Previous { user_id: String, game_id: String },
    Reset { user_id: String, game_id: String },
    Reveal { user_id: String, game_id: String },
    SelectCharacter { user_id: String, game_id: String, character_id: String },
    CloseSession { user_id: String, game_id: String },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Courses { courses: Vec<CourseView> },
    LessonCompleted(LessonCompleteOut),
    LessonResult(LessonSubmitReply),
    User(UserView),
    Games { games: Vec<GameSummary> },
    Session { session: SessionView },
    SubmitResult(SubmitReply),
    Hint(HintOut),
    Reveal(RevealOut),
    Closed { closed: bool },
    Error(ErrorOut),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageView {
    pub index: usize,
    pub title: String,
    pub description: String,
    pub starter_code: String,
    pub has_expected_output: bool,
    pub hint_count: usize,
    /// Filled only while hints are toggled on.
    pub hints: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub game_id: String,
    pub kind: ChallengeKind,
    pub state: MachineState,
    pub current_stage_index: usize,
    pub stage_count: usize,
    pub score: u32,
    pub is_complete: bool,
    pub hint_visible: bool,
    pub incorrect: bool,
    pub stage: Option<StageView>,
    pub auxiliary_data: AuxData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_from: Option<String>,
}

/// Convert the live machine to the public DTO.
pub fn session_view(m: &ChallengeStageMachine) -> SessionView {
    let stage = if m.is_complete() {
        None
    } else {
        m.current_stage().map(|s| StageView {
            index: s.index,
            title: s.title.clone(),
            description: s.description.clone(),
            starter_code: s.starter_code.clone(),
            has_expected_output: s.expected_output.is_some(),
            hint_count: s.hints.len(),
            hints: if m.hint_visible() { s.hints.clone() } else { Vec::new() },
        })
    };
    SessionView {
        game_id: m.game_id().to_string(),
        kind: m.kind(),
        state: m.state(),
        current_stage_index: m.current_stage_index(),
        stage_count: m.stages().len(),
        score: m.score(),
        is_complete: m.is_complete(),
        hint_visible: m.hint_visible(),
        incorrect: m.incorrect_signal(),
        stage,
        auxiliary_data: m.aux().clone(),
        recovered_from: m.corrupt_resume().map(|c| c.to_string()),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub user_id: String,
    pub experience: u64,
    pub level: u64,
    pub xp_into_level: u64,
    pub xp_to_next_level: u64,
    pub streak: u32,
    pub coins: u64,
}

pub fn user_view(user_id: &str, u: &UserSnapshot) -> UserView {
    UserView {
        user_id: user_id.to_string(),
        experience: u.experience,
        level: u.level(),
        xp_into_level: u.xp_into_level(),
        xp_to_next_level: u.xp_to_next_level(),
        streak: u.streak,
        coins: u.coins,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub id: String,
    pub title: String,
    pub kind: GameKind,
    pub description: String,
    pub stage_count: usize,
    pub stage_award: u32,
}

pub fn game_summary(g: &Game) -> GameSummary {
    GameSummary {
        id: g.id.clone(),
        title: g.title.clone(),
        kind: g.kind,
        description: g.description.clone(),
        stage_count: g.to_stages().len(),
        stage_award: g.kind.stage_award(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonCompleteIn {
    pub user_id: String,
    #[serde(flatten)]
    pub lesson: LessonRef,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonCompleteOut {
    pub award: CompletionAward,
    pub level_change: LevelChange,
    pub user: UserView,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSubmitIn {
    pub user_id: String,
    #[serde(flatten)]
    pub lesson: LessonRef,
    #[serde(default)]
    pub code: String,
}

/// Outcome of a coding lesson submission. `completion` is present on the
/// submission that passed the lesson.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSubmitReply {
    pub outcome: SubmitOutcome,
    pub session: SessionView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<LessonCompleteOut>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIn {
    pub user_id: String,
    pub game_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitIn {
    pub user_id: String,
    pub game_id: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterIn {
    pub user_id: String,
    pub game_id: String,
    pub character_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReply {
    pub outcome: SubmitOutcome,
    pub session: SessionView,
    /// Present when this submission completed the game and XP was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HintOut {
    pub visible: bool,
    pub hints: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealOut {
    pub fixed_code: Option<String>,
    pub session: SessionView,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub code: String,
    pub message: String,
}

pub fn error_out(e: &EngineError) -> ErrorOut {
    ErrorOut { code: e.code().to_string(), message: e.to_string() }
}

#[derive(Debug, Serialize)]
pub struct ClosedOut {
    pub closed: bool,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
