mod common;

use lasertutor::model::transport::Operation;
use lasertutor::progress::QuizOutcome;
use lasertutor::quiz::{QuizResult, QuizSession, QuizStep};
use lasertutor::store::Action;
use tokio::sync::mpsc;

use crate::common::setup;

/// Answers every question of `lesson_id`'s quiz, getting the last one wrong
/// when `miss_last` is set, and returns what the completion callback saw.
async fn take_quiz(app: &common::TestApp, lesson_id: &str, miss_last: bool) -> QuizResult {
    let questions = app
        .repo
        .catalog()
        .lesson(lesson_id)
        .and_then(|l| l.quiz())
        .map(|q| q.questions.clone())
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = QuizSession::new(lesson_id, questions, move |result: &QuizResult| {
        tx.send(result.clone()).unwrap();
    })
    .unwrap();

    loop {
        let (index, question) = session.current().map(|(i, q)| (i, q.clone())).unwrap();
        let answer = if miss_last && index + 1 == session.len() {
            (question.correct_answer + 1) % question.options.len()
        } else {
            question.correct_answer
        };
        session.select(answer).unwrap();
        session.submit_answer().unwrap();

        if let QuizStep::Completed(_) = session.next().unwrap() {
            break;
        }
    }

    // the callback fires exactly once
    assert_eq!(session.next().unwrap(), QuizStep::AlreadyCompleted);
    drop(session);

    let result = rx.recv().await.unwrap();
    assert!(rx.recv().await.is_none());
    result
}

#[tokio::test]
async fn four_of_five_scores_eighty_percent() {
    let app = setup();
    let result = take_quiz(&app, "laser-fundamentals", true).await;
    assert_eq!((result.correct_answers, result.total_questions), (4, 5));

    let mut hook = app.hook("laser-fundamentals");
    let QuizOutcome::Recorded(completion) = hook.complete_quiz(result).await.unwrap() else {
        panic!("first submission must be recorded");
    };

    assert_eq!(completion.submission.percentage, 80);
    assert_eq!(completion.submission.points, 80);
    // quiz only: 80% of the 70% quiz weight
    assert_eq!(completion.lesson_score, 56);
    // the stored score never goes below the quiz points
    assert_eq!(completion.progress.score(), 80);
    assert!(completion.progress.completed());
    assert_eq!(completion.progress.components().quiz().map(|m| m.score), Some(80));

    let unit = completion.unit.expect("unit points awarded");
    assert_eq!(unit.total_points, 105);

    let user = app.user();
    assert_eq!(user.points, 80);
    assert!(user.has_completed("laser-fundamentals"));
    assert_eq!(user.current_streak, 1);
    assert!(user.achievements.iter().any(|a| a.id == "first-light" && a.unlocked));

    assert!(hook.error().is_none());
    assert!(app.notified("Quiz completed! 80% (80/100 points)"));
}

#[tokio::test]
async fn a_quiz_attempt_is_credited_once() {
    let app = setup();
    let result = take_quiz(&app, "laser-fundamentals", false).await;
    let mut hook = app.hook("laser-fundamentals");

    hook.complete_quiz(result.clone()).await.unwrap();
    let upserts = app.primary.calls(Operation::Upsert);
    let points = app.user().points;

    let again = hook.complete_quiz(result.clone()).await.unwrap();

    assert_eq!(again, QuizOutcome::AlreadyRecorded(result.attempt_id));
    assert_eq!(app.primary.calls(Operation::Upsert), upserts);
    assert_eq!(app.user().points, points);
    assert_eq!(app.store.read(|s| s.quiz_results().len()), 1);
}

#[tokio::test(start_paused = true)]
async fn unit_completion_failure_keeps_the_lesson() {
    let app = setup();
    app.primary.fail_next(Operation::UnitCompletion, 3);
    let result = take_quiz(&app, "laser-fundamentals", false).await;
    let mut hook = app.hook("laser-fundamentals");

    let QuizOutcome::Recorded(completion) = hook.complete_quiz(result).await.unwrap() else {
        panic!("first submission must be recorded");
    };

    assert!(completion.unit.is_none());
    assert!(completion.progress.completed());
    assert!(hook.error().is_some());
    assert_eq!(app.user().points, 100);
    assert!(app.notified("Failed to process unit completion. Please try again later."));
}

#[tokio::test]
async fn load_needs_a_signed_in_learner() {
    let app = setup();
    app.store.dispatch(Action::Logout).unwrap();
    let mut hook = app.hook("laser-fundamentals");
    assert!(hook.is_loading());

    assert!(hook.load().await.unwrap().is_none());

    assert!(!hook.is_loading());
    assert_eq!(app.primary.calls(Operation::Fetch), 0);
}

#[tokio::test]
async fn load_reports_fetch_errors() {
    let app = setup();
    app.primary.fail_next(Operation::Fetch, 1);
    let mut hook = app.hook("laser-fundamentals");

    assert!(hook.load().await.is_err());
    assert!(!hook.is_loading());
    assert!(hook.error().is_some_and(|e| e.contains("unavailable")));

    app.repo.mark_complete("laser-fundamentals", 70).await.unwrap();
    let progress = hook.load().await.unwrap().cloned().unwrap();
    assert_eq!(progress.score(), 70);
}
