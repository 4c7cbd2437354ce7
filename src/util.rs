//! Small utility helpers used across modules.

/// Key under which a (user, game) session is persisted.
pub fn session_key(user_id: &str, game_id: &str) -> String {
  format!("{}:{}", user_id, game_id)
}

/// Session id of a coding lesson, used in place of a game id.
pub fn lesson_session_id(course_id: &str, topic_id: &str, lesson_id: &str) -> String {
  format!("lesson/{}/{}/{}", course_id, topic_id, lesson_id)
}

/// Program output with trailing whitespace stripped from every line and
/// leading/trailing blank lines dropped. `\r\n` is treated as `\n`.
pub fn normalize_output(s: &str) -> String {
  let lines: Vec<&str> = s.lines().map(|l| l.trim_end()).collect();
  lines.join("\n").trim_matches('\n').to_string()
}

pub fn outputs_match(actual: &str, expected: &str) -> bool {
  normalize_output(actual) == normalize_output(expected)
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge runner responses.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}
