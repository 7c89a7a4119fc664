//! Task Generator
//!
//! Teacher-side generation of validated task records from a scheduler
//! signal. Each domain has difficulty tiers; degenerate draws are retried
//! a bounded number of times before falling back to the easiest tier.

use std::collections::{BTreeMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::error::CoevoError;
use crate::tasks::{Domain, Task, VerifierSpec};
use crate::utils::now_millis;

/// How many times a degenerate draw (zero determinant, equal roots) is
/// retried before the tier falls back.
const MAX_DRAW_RETRIES: usize = 10;

/// A prompt supplied by the caller instead of a generated one. The caller
/// is responsible for attaching a verifier that fits the prompt.
#[derive(Debug, Clone)]
pub struct PromptOverride {
    pub prompt: String,
    pub verifier: VerifierSpec,
}

/// Scheduler signal the generator consumes.
#[derive(Debug, Clone)]
pub struct TaskSignal {
    pub domain: Domain,
    pub difficulty: f64,
    pub next_task_id: String,
    pub prompt_override: Option<PromptOverride>,
}

pub struct TaskGenerator {
    rng: StdRng,
    seen_ids: HashSet<String>,
}

impl TaskGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            seen_ids: HashSet::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seen_ids: HashSet::new(),
        }
    }

    /// Emit a validated task, or fail with `GeneratorExhausted` after one
    /// regeneration attempt.
    pub fn generate(&mut self, signal: &TaskSignal) -> Result<Task, CoevoError> {
        let mut last_reason = String::new();
        for attempt in 0..2 {
            let task = self.build(signal);
            match self.validate(&task) {
                Ok(()) => {
                    self.seen_ids.insert(task.task_id.clone());
                    return Ok(task);
                }
                Err(reason) => {
                    warn!(attempt, domain = %signal.domain, reason = %reason, "generated task failed validation");
                    last_reason = reason;
                }
            }
        }
        Err(CoevoError::GeneratorExhausted {
            domain: signal.domain.to_string(),
            reason: last_reason,
        })
    }

    fn build(&mut self, signal: &TaskSignal) -> Task {
        if let Some(over) = &signal.prompt_override {
            return self.assemble(signal, over.prompt.clone(), over.verifier.clone(), "override");
        }
        let (prompt, verifier, tier) = match signal.domain {
            Domain::Math => self.math_task(signal.difficulty),
            Domain::Logic => self.logic_task(signal.difficulty),
            Domain::Code => self.code_task(signal.difficulty),
        };
        self.assemble(signal, prompt, verifier, tier)
    }

    fn assemble(
        &mut self,
        signal: &TaskSignal,
        prompt: String,
        verifier: VerifierSpec,
        tier: &str,
    ) -> Task {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "created_at".to_string(),
            serde_json::Value::from(now_millis()),
        );
        metadata.insert("tier".to_string(), serde_json::Value::from(tier));
        Task {
            task_id: signal.next_task_id.clone(),
            domain: signal.domain,
            difficulty: signal.difficulty.clamp(0.0, 1.0),
            prompt,
            constraints: vec![
                "show reasoning".to_string(),
                "use tools if needed".to_string(),
            ],
            verifier,
            metadata,
        }
    }

    fn validate(&self, task: &Task) -> Result<(), String> {
        if task.prompt.trim().is_empty() {
            return Err("empty prompt".to_string());
        }
        if task.prompt.chars().count() > 1000 {
            return Err("prompt exceeds 1000 characters".to_string());
        }
        if task
            .prompt
            .chars()
            .any(|c| (c as u32) < 0x20 && c != '\n' && c != '\t')
        {
            return Err("prompt contains control characters".to_string());
        }
        if task.task_id.is_empty() {
            return Err("empty task id".to_string());
        }
        if self.seen_ids.contains(&task.task_id) {
            return Err(format!("duplicate task id `{}`", task.task_id));
        }
        Ok(())
    }

    // --- math ---

    fn math_task(&mut self, difficulty: f64) -> (String, VerifierSpec, &'static str) {
        if difficulty < 0.3 {
            self.linear_equation()
        } else if difficulty < 0.6 {
            self.quadratic_equation()
        } else {
            self.linear_system()
        }
    }

    /// `a*x + b = c` with an integer root.
    fn linear_equation(&mut self) -> (String, VerifierSpec, &'static str) {
        let a: i64 = self.rng.gen_range(1..=9);
        let x: i64 = self.rng.gen_range(-10..=10);
        let b: i64 = self.rng.gen_range(-20..=20);
        let c = a * x + b;
        let prompt = if b == 0 {
            format!("Solve for x: {a}x = {c}.")
        } else {
            format!("Solve for x: {a}x {} = {c}.", signed_term(b))
        };
        (
            prompt,
            VerifierSpec::Numeric {
                expected: x as f64,
                tolerance: 1e-6,
            },
            "linear",
        )
    }

    /// `x^2 - (r1+r2)x + r1*r2 = 0` with two distinct integer roots.
    fn quadratic_equation(&mut self) -> (String, VerifierSpec, &'static str) {
        for _ in 0..MAX_DRAW_RETRIES {
            let r1: i64 = self.rng.gen_range(-5..=5);
            let r2: i64 = self.rng.gen_range(-5..=5);
            if r1 == r2 {
                continue;
            }
            let s = r1 + r2;
            let p = r1 * r2;
            let mut equation = "x^2".to_string();
            if s != 0 {
                equation.push_str(&format!(" {}x", signed_term(-s)));
            }
            if p != 0 {
                equation.push_str(&format!(" {}", signed_term(p)));
            }
            let prompt = format!(
                "Find all real x with {equation} = 0. Give both roots separated by a comma."
            );
            return (
                prompt,
                VerifierSpec::NumericSet {
                    expected: vec![r1 as f64, r2 as f64],
                    tolerance: 1e-6,
                },
                "quadratic",
            );
        }
        debug!("quadratic draw degenerate ten times; falling back to linear tier");
        self.linear_equation()
    }

    /// 2x2 integer system with a unique solution.
    fn linear_system(&mut self) -> (String, VerifierSpec, &'static str) {
        for _ in 0..MAX_DRAW_RETRIES {
            let a: i64 = self.rng.gen_range(-5..=5);
            let b: i64 = self.rng.gen_range(-5..=5);
            let c: i64 = self.rng.gen_range(-5..=5);
            let d: i64 = self.rng.gen_range(-5..=5);
            if a * d - b * c == 0 {
                continue;
            }
            let x: i64 = self.rng.gen_range(-5..=5);
            let y: i64 = self.rng.gen_range(-5..=5);
            let e = a * x + b * y;
            let f = c * x + d * y;
            let prompt = format!(
                "Solve the system: {} and {}. Give x and y separated by a comma.",
                equation_2x2(a, b, e),
                equation_2x2(c, d, f)
            );
            return (
                prompt,
                VerifierSpec::NumericSet {
                    expected: vec![x as f64, y as f64],
                    tolerance: 1e-6,
                },
                "system",
            );
        }
        debug!("singular system ten times; falling back to linear tier");
        self.linear_equation()
    }

    // --- logic ---

    fn logic_task(&mut self, difficulty: f64) -> (String, VerifierSpec, &'static str) {
        if difficulty < 0.3 {
            self.syllogism()
        } else if difficulty < 0.6 {
            self.day_chain()
        } else {
            self.ordering_puzzle()
        }
    }

    fn syllogism(&mut self) -> (String, VerifierSpec, &'static str) {
        const TRIPLES: &[[&str; 3]] = &[
            ["bloops", "razzies", "lazzies"],
            ["wugs", "fleems", "snorps"],
            ["glims", "trundles", "vexes"],
        ];
        let [a, b, c] = TRIPLES[self.rng.gen_range(0..TRIPLES.len())];
        let valid = self.rng.gen_bool(0.5);
        let (prompt, answer) = if valid {
            (
                format!(
                    "All {a} are {b}. All {b} are {c}. Is every {a} necessarily one of the {c}? \
                     Answer yes or no."
                ),
                "yes",
            )
        } else {
            (
                format!(
                    "Some {a} are {b}. All {b} are {c}. Is every {a} necessarily one of the {c}? \
                     Answer yes or no."
                ),
                "no",
            )
        };
        (
            prompt,
            VerifierSpec::RegexMatch {
                pattern: format!("(?i){answer}\\.?"),
            },
            "deduction",
        )
    }

    fn day_chain(&mut self) -> (String, VerifierSpec, &'static str) {
        const DAYS: [&str; 7] = [
            "Monday",
            "Tuesday",
            "Wednesday",
            "Thursday",
            "Friday",
            "Saturday",
            "Sunday",
        ];
        let start = self.rng.gen_range(0..7);
        let offset = self.rng.gen_range(3..=20);
        let answer = DAYS[(start + offset) % 7];
        let prompt = format!(
            "If today is {}, what day of the week will it be in {offset} days?",
            DAYS[start]
        );
        (
            prompt,
            VerifierSpec::RegexMatch {
                pattern: format!("(?i){answer}\\.?"),
            },
            "chain",
        )
    }

    fn ordering_puzzle(&mut self) -> (String, VerifierSpec, &'static str) {
        const NAMES: [&str; 4] = ["Ava", "Ben", "Cara", "Dev"];
        // Draw three distinct names; the statements fix a strict order.
        let mut picked: Vec<&str> = Vec::new();
        while picked.len() < 3 {
            let name = NAMES[self.rng.gen_range(0..NAMES.len())];
            if !picked.contains(&name) {
                picked.push(name);
            }
        }
        let (tallest, middle, shortest) = (picked[0], picked[1], picked[2]);
        let ask_tallest = self.rng.gen_bool(0.5);
        let (question, answer) = if ask_tallest {
            ("tallest", tallest)
        } else {
            ("shortest", shortest)
        };
        let prompt = format!(
            "{tallest} is taller than {middle}. {shortest} is shorter than {middle}. \
             Of the three, who is the {question}?"
        );
        (
            prompt,
            VerifierSpec::RegexMatch {
                pattern: format!("(?i){answer}\\.?"),
            },
            "puzzle",
        )
    }

    // --- code ---

    fn code_task(&mut self, difficulty: f64) -> (String, VerifierSpec, &'static str) {
        let specs: &[(&str, &str)] = if difficulty < 0.3 {
            &[
                (
                    "Write a Python function add(a, b) that returns the sum of a and b.",
                    "{{candidate}}\nadd(2, 3) == 5 and add(-1, 1) == 0 and add(10, 20) == 30",
                ),
                (
                    "Write a Python function is_even(n) that returns True when n is even.",
                    "{{candidate}}\nis_even(4) and not is_even(7) and is_even(0)",
                ),
            ]
        } else if difficulty < 0.6 {
            &[
                (
                    "Write a Python function reverse_string(s) that returns s reversed.",
                    "{{candidate}}\nreverse_string('abc') == 'cba' and reverse_string('') == ''",
                ),
                (
                    "Write a Python function max_value(xs) that returns the largest element \
                     of a non-empty list.",
                    "{{candidate}}\nmax_value([3, 1, 2]) == 3 and max_value([-5, -2]) == -2",
                ),
            ]
        } else {
            &[
                (
                    "Write a Python function binary_search(xs, target) that returns the index \
                     of target in the sorted list xs, or -1 when absent.",
                    "{{candidate}}\nbinary_search([1, 3, 5, 7, 9], 7) == 3 \
                     and binary_search([1, 3, 5], 4) == -1 and binary_search([], 1) == -1",
                ),
                (
                    "Write a Python function first_primes(n) that returns the first n prime \
                     numbers as a list.",
                    "{{candidate}}\nfirst_primes(5) == [2, 3, 5, 7, 11] and first_primes(1) == [2]",
                ),
            ]
        };
        let tier = if difficulty < 0.3 {
            "code_easy"
        } else if difficulty < 0.6 {
            "code_medium"
        } else {
            "code_hard"
        };
        let (spec_text, body) = specs[self.rng.gen_range(0..specs.len())];
        let prompt = format!("{spec_text} Reply with the code only.");
        (
            prompt,
            VerifierSpec::PythonPredicate {
                body: body.to_string(),
            },
            tier,
        )
    }
}

impl Default for TaskGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn signed_term(value: i64) -> String {
    if value < 0 {
        format!("- {}", -value)
    } else {
        format!("+ {value}")
    }
}

fn equation_2x2(a: i64, b: i64, rhs: i64) -> String {
    format!("{a}x {}y = {rhs}", signed_term(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(domain: Domain, difficulty: f64, id: &str) -> TaskSignal {
        TaskSignal {
            domain,
            difficulty,
            next_task_id: id.to_string(),
            prompt_override: None,
        }
    }

    #[test]
    fn easy_math_emits_linear_numeric_task() {
        let mut generator = TaskGenerator::with_seed(7);
        let task = generator
            .generate(&signal(Domain::Math, 0.2, "t1"))
            .unwrap();
        assert_eq!(task.domain, Domain::Math);
        assert!(task.prompt.starts_with("Solve for x:"));
        assert!(matches!(task.verifier, VerifierSpec::Numeric { .. }));
        assert_eq!(task.metadata["tier"], "linear");
    }

    #[test]
    fn medium_math_has_two_distinct_roots() {
        let mut generator = TaskGenerator::with_seed(11);
        for i in 0..20 {
            let task = generator
                .generate(&signal(Domain::Math, 0.4, &format!("t{i}")))
                .unwrap();
            match task.verifier {
                VerifierSpec::NumericSet { ref expected, .. } => {
                    assert_eq!(expected.len(), 2);
                    assert_ne!(expected[0], expected[1]);
                }
                ref other => panic!("unexpected verifier {other:?}"),
            }
        }
    }

    #[test]
    fn hard_math_system_solution_satisfies_equations() {
        let mut generator = TaskGenerator::with_seed(3);
        let task = generator
            .generate(&signal(Domain::Math, 0.8, "t1"))
            .unwrap();
        assert!(task.prompt.contains("system"));
        assert!(matches!(task.verifier, VerifierSpec::NumericSet { .. }));
    }

    #[test]
    fn duplicate_task_id_exhausts_the_generator() {
        let mut generator = TaskGenerator::with_seed(5);
        generator.generate(&signal(Domain::Math, 0.2, "t1")).unwrap();
        let err = generator
            .generate(&signal(Domain::Math, 0.2, "t1"))
            .unwrap_err();
        assert!(matches!(err, CoevoError::GeneratorExhausted { .. }));
    }

    #[test]
    fn override_passes_through_with_its_verifier() {
        let mut generator = TaskGenerator::with_seed(5);
        let task = generator
            .generate(&TaskSignal {
                domain: Domain::Logic,
                difficulty: 0.5,
                next_task_id: "t-override".to_string(),
                prompt_override: Some(PromptOverride {
                    prompt: "Is water wet? Answer yes or no.".to_string(),
                    verifier: VerifierSpec::ExactString {
                        expected: "yes".to_string(),
                    },
                }),
            })
            .unwrap();
        assert_eq!(task.prompt, "Is water wet? Answer yes or no.");
        assert_eq!(task.metadata["tier"], "override");
    }

    #[test]
    fn code_tasks_carry_predicate_verifiers_with_candidate_slot() {
        let mut generator = TaskGenerator::with_seed(9);
        for (i, difficulty) in [0.1, 0.5, 0.9].iter().enumerate() {
            let task = generator
                .generate(&signal(Domain::Code, *difficulty, &format!("c{i}")))
                .unwrap();
            match task.verifier {
                VerifierSpec::PythonPredicate { ref body } => {
                    assert!(body.contains("{{candidate}}"));
                }
                ref other => panic!("unexpected verifier {other:?}"),
            }
        }
    }

    #[test]
    fn logic_tasks_use_anchored_surface_form_patterns() {
        let mut generator = TaskGenerator::with_seed(13);
        let task = generator
            .generate(&signal(Domain::Logic, 0.5, "l1"))
            .unwrap();
        assert!(matches!(task.verifier, VerifierSpec::RegexMatch { .. }));
    }

    #[test]
    fn all_generated_prompts_validate() {
        let mut generator = TaskGenerator::with_seed(17);
        let mut n = 0;
        for domain in Domain::ALL {
            for difficulty in [0.1, 0.45, 0.85] {
                for _ in 0..10 {
                    n += 1;
                    let task = generator
                        .generate(&signal(domain, difficulty, &format!("v{n}")))
                        .unwrap();
                    assert!(!task.prompt.is_empty());
                    assert!(task.prompt.chars().count() <= 1000);
                }
            }
        }
    }
}
