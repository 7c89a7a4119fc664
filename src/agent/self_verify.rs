//! Self-verification
//!
//! Consensus over independently sampled answers. Answers are normalized
//! (whitespace, case, numeric rounding, trailing punctuation) before
//! voting so `4`, `4.0` and `4.` agree.

/// Normalize an answer for consensus comparison.
pub fn normalize_answer(answer: &str) -> String {
    let mut normalized = answer.trim().to_lowercase();
    if let Ok(value) = normalized.parse::<f64>() {
        return format!("{value:.2}");
    }
    while let Some(last) = normalized.chars().last() {
        if matches!(last, '.' | ',' | '!' | '?' | ';' | ':') {
            normalized.pop();
        } else {
            break;
        }
    }
    normalized
}

/// Modal answer over a sample set.
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    /// The original (un-normalized) answer of the first sample in the
    /// modal class.
    pub answer: String,
    /// `mode_count / samples`, in [0, 1].
    pub confidence: f64,
}

/// Compute the modal answer and its agreement rate. Ties resolve to the
/// class seen first, keeping the result deterministic in sample order.
pub fn consensus(answers: &[String]) -> Consensus {
    if answers.is_empty() {
        return Consensus {
            answer: String::new(),
            confidence: 0.0,
        };
    }

    let normalized: Vec<String> = answers.iter().map(|a| normalize_answer(a)).collect();
    let mut best_index = 0;
    let mut best_count = 0;
    for (i, class) in normalized.iter().enumerate() {
        let count = normalized.iter().filter(|n| *n == class).count();
        if count > best_count {
            best_count = count;
            best_index = i;
        }
    }

    Consensus {
        answer: answers[best_index].clone(),
        confidence: best_count as f64 / answers.len() as f64,
    }
}
