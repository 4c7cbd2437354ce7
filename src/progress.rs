//! Course / topic / lesson locking and completion.
//!
//! Lock state is always recomputed from completion flags and ordering. Lock
//! flags that arrive with fetched aggregates are never trusted.
//!
//! Evaluation is top-down and short-circuits: a lesson inside a locked topic
//! is locked, and a topic inside a locked course is locked, regardless of
//! their own predecessors.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::domain::{Course, EntityRef, Lesson, LessonKind, LessonRef, Topic};
use crate::error::EngineError;

/// External award seam: decides how much XP a freshly completed lesson is worth.
#[async_trait]
pub trait AwardPolicy: Send + Sync {
  async fn award_lesson(&self, user_id: &str, lesson: &Lesson) -> Result<u64, EngineError>;
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
  pub completed_count: usize,
  pub total_count: usize,
  pub percent: u32,
}

impl Progress {
  fn from_counts(completed_count: usize, total_count: usize) -> Self {
    let percent = if total_count == 0 {
      0
    } else {
      ((completed_count as f64 / total_count as f64) * 100.0).round() as u32
    };
    Progress { completed_count, total_count, percent }
  }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionAward {
  pub xp_awarded: u64,
  pub already_completed: bool,
  pub topic_progress: Progress,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonView {
  pub id: String,
  pub title: String,
  pub kind: LessonKind,
  pub completed: bool,
  pub locked: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicView {
  pub id: String,
  pub title: String,
  pub locked: bool,
  pub progress: Progress,
  pub lessons: Vec<LessonView>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseView {
  pub id: String,
  pub title: String,
  pub locked: bool,
  pub progress: Progress,
  pub topics: Vec<TopicView>,
}

/// Owns the completion flags of an ordered course list.
#[derive(Clone, Debug, Default)]
pub struct ProgressModel {
  courses: Vec<Course>,
}

fn course_locked_at(courses: &[Course], ci: usize) -> bool {
  ci > 0 && !courses[ci - 1].is_fully_completed()
}

fn topic_locked_at(course: &Course, ti: usize) -> bool {
  ti > 0 && !course.topics[ti - 1].is_fully_completed()
}

fn lesson_locked_at(topic: &Topic, li: usize) -> bool {
  li > 0 && !topic.lessons[li - 1].is_done()
}

impl ProgressModel {
  pub fn new(courses: Vec<Course>) -> Self {
    Self { courses }
  }

  pub fn lesson(&self, r: &LessonRef) -> Result<&Lesson, EngineError> {
    let (ci, ti, li) = self.locate(r)?;
    Ok(&self.courses[ci].topics[ti].lessons[li])
  }

  fn course_index(&self, course_id: &str) -> Result<usize, EngineError> {
    self.courses
      .iter()
      .position(|c| c.id == course_id)
      .ok_or_else(|| EngineError::not_found("course", course_id))
  }

  fn topic_index(course: &Course, topic_id: &str) -> Result<usize, EngineError> {
    course.topics
      .iter()
      .position(|t| t.id == topic_id)
      .ok_or_else(|| EngineError::not_found("topic", topic_id))
  }

  fn lesson_index(topic: &Topic, lesson_id: &str) -> Result<usize, EngineError> {
    topic.lessons
      .iter()
      .position(|l| l.id == lesson_id)
      .ok_or_else(|| EngineError::not_found("lesson", lesson_id))
  }

  fn locate(&self, r: &LessonRef) -> Result<(usize, usize, usize), EngineError> {
    let ci = self.course_index(&r.course_id)?;
    let course = &self.courses[ci];
    let ti = Self::topic_index(course, &r.topic_id)?;
    let li = Self::lesson_index(&course.topics[ti], &r.lesson_id)?;
    Ok((ci, ti, li))
  }

  fn lesson_locked(&self, ci: usize, ti: usize, li: usize) -> bool {
    let course = &self.courses[ci];
    course_locked_at(&self.courses, ci)
      || topic_locked_at(course, ti)
      || lesson_locked_at(&course.topics[ti], li)
  }

  /// Unknown ids fail with `NotFound`; they are never treated as unlocked.
  pub fn is_locked(&self, entity: &EntityRef) -> Result<bool, EngineError> {
    match entity {
      EntityRef::Course { course_id } => {
        let ci = self.course_index(course_id)?;
        Ok(course_locked_at(&self.courses, ci))
      }
      EntityRef::Topic { course_id, topic_id } => {
        let ci = self.course_index(course_id)?;
        let course = &self.courses[ci];
        let ti = Self::topic_index(course, topic_id)?;
        Ok(course_locked_at(&self.courses, ci) || topic_locked_at(course, ti))
      }
      EntityRef::Lesson(r) => {
        let (ci, ti, li) = self.locate(r)?;
        Ok(self.lesson_locked(ci, ti, li))
      }
    }
  }

  /// Marks a lesson done and returns what the award policy granted.
  ///
  /// Repeating the call on a completed lesson awards nothing and never reaches
  /// the policy.
  #[instrument(level = "info", skip(self, policy), fields(%user_id, course = %lesson.course_id, topic = %lesson.topic_id, lesson = %lesson.lesson_id))]
  pub async fn mark_lesson_completed(
    &mut self,
    user_id: &str,
    lesson: &LessonRef,
    policy: &dyn AwardPolicy,
  ) -> Result<CompletionAward, EngineError> {
    let (ci, ti, li) = self.locate(lesson)?;

    if self.courses[ci].topics[ti].lessons[li].is_done() {
      debug!(target: "progress", "Lesson already completed; no award");
      return Ok(CompletionAward {
        xp_awarded: 0,
        already_completed: true,
        topic_progress: Self::compute_progress(&self.courses[ci].topics[ti]),
      });
    }

    if self.lesson_locked(ci, ti, li) {
      return Err(EngineError::Locked(format!("lesson {}", lesson.lesson_id)));
    }

    let xp_awarded = policy
      .award_lesson(user_id, &self.courses[ci].topics[ti].lessons[li])
      .await?;

    let topic = &mut self.courses[ci].topics[ti];
    topic.lessons[li].mark_done();
    let topic_progress = Self::compute_progress(topic);
    info!(target: "progress", xp_awarded, completed = topic_progress.completed_count, total = topic_progress.total_count, "Lesson completed");

    Ok(CompletionAward { xp_awarded, already_completed: false, topic_progress })
  }

  pub fn compute_progress(topic: &Topic) -> Progress {
    let done = topic.lessons.iter().filter(|l| l.is_done()).count();
    Progress::from_counts(done, topic.lessons.len())
  }

  pub fn course_progress(course: &Course) -> Progress {
    let (done, total) = course.topics.iter().fold((0, 0), |(d, t), topic| {
      (d + topic.lessons.iter().filter(|l| l.is_done()).count(), t + topic.lessons.len())
    });
    Progress::from_counts(done, total)
  }

  /// Display view of every course with lock and progress state resolved.
  pub fn outline(&self) -> Vec<CourseView> {
    self.courses
      .iter()
      .enumerate()
      .map(|(ci, course)| {
        let course_locked = course_locked_at(&self.courses, ci);
        let topics = course.topics
          .iter()
          .enumerate()
          .map(|(ti, topic)| {
            let topic_locked = course_locked || topic_locked_at(course, ti);
            let lessons = topic.lessons
              .iter()
              .enumerate()
              .map(|(li, lesson)| LessonView {
                id: lesson.id.clone(),
                title: lesson.title.clone(),
                kind: lesson.kind,
                completed: lesson.is_done(),
                locked: topic_locked || lesson_locked_at(topic, li),
              })
              .collect();
            TopicView {
              id: topic.id.clone(),
              title: topic.title.clone(),
              locked: topic_locked,
              progress: Self::compute_progress(topic),
              lessons,
            }
          })
          .collect();
        CourseView {
          id: course.id.clone(),
          title: course.title.clone(),
          locked: course_locked,
          progress: Self::course_progress(course),
          topics,
        }
      })
      .collect()
  }
}
