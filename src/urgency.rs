use chrono::NaiveDate;
use crate::models::Task;

/// Calculates the urgency score for a given task as of `today`.
///
/// The score is based on:
/// - **Nearest date**: the earliest of due, committed and planned dates.
///   Closer dates yield higher scores. Overdue tasks get a significant boost.
/// - **Expected Duration**: Longer tasks slightly increase urgency.
/// - **Priority**: multiplies the result.
///
/// Undated backlog work scores low but positive.
///
/// # Returns
/// - `-1.0` if the task is done.
/// - A positive float representing urgency (higher is more urgent).
pub fn compute_urgency(task: &Task, today: NaiveDate) -> f64 {
    if task.is_done() {
        return -1.0;
    }
    let hours = task.duration_minutes.map(|m| f64::from(m) / 60.0).unwrap_or(0.0);
    let nearest = [task.due_date, task.committed_date, task.do_date]
        .into_iter()
        .flatten()
        .min();
    let base = match nearest {
        None => 1.0 + hours / 8.0,
        Some(date) => {
            let days_left = (date - today).num_days();
            if days_left <= 0 {
                // overdue or due today -> high urgency
                100.0 + hours + (days_left.abs() as f64 * 2.0)
            } else {
                // closer date -> higher urgency; longer tasks increase urgency
                (1.0 / (days_left as f64)) * 10.0 * (1.0 + hours / 8.0)
            }
        }
    };
    let score = base * task.priority.weight();
    // clamp to a reasonable range
    if score.is_finite() { score } else { 0.0 }
}
