//! The `questpath quiz` command: an interactive practice session on stdin.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use questpath_core::engine::{AnswerFeedback, SessionSummary};
use questpath_core::model::{Answer, MatchPair};
use questpath_core::session::QuestionView;

/// A line holding only this ends a code answer.
const CODE_TERMINATOR: &str = ".";

pub async fn execute(
    user: String,
    subject: String,
    node: String,
    config: Option<PathBuf>,
) -> Result<()> {
    let engine = super::build_engine(config.as_deref())?;
    let node_name = engine.curriculum().node(&subject, &node)?.name.clone();

    let snapshot = engine.start_session(&user, &subject, &node).await?;
    let id = snapshot.id;
    println!(
        "{node_name}: {} question(s), {} heart(s)",
        snapshot.total, snapshot.hearts
    );

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut question = snapshot.question;
    let mut position = 1;

    while let Some(view) = question.take() {
        println!("\nQuestion {position}/{}", snapshot.total);
        print_question(&view);

        let answer = loop {
            let Some(raw) = read_answer(&mut input, &view).await? else {
                engine.abandon_session(id)?;
                bail!("input closed before the session finished; session abandoned");
            };
            match parse_answer(&view, &raw) {
                Ok(answer) => break answer,
                Err(e) => println!("  {e}, try again"),
            }
        };

        let feedback = engine.submit_answer(id, &answer).await?;
        print_feedback(&feedback);

        let next = engine.continue_session(id).await?;
        if let Some(summary) = next.summary {
            print_summary(&engine, &summary);
            break;
        }
        question = next.next;
        position += 1;
    }

    Ok(())
}

async fn read_answer(
    input: &mut Lines<BufReader<Stdin>>,
    view: &QuestionView,
) -> Result<Option<String>> {
    if view.template.is_none() {
        return input.next_line().await.context("failed to read answer");
    }

    let mut code = String::new();
    loop {
        match input.next_line().await.context("failed to read answer")? {
            Some(line) if line.trim() == CODE_TERMINATOR => return Ok(Some(code)),
            Some(line) => {
                code.push_str(&line);
                code.push('\n');
            }
            None if code.is_empty() => return Ok(None),
            None => return Ok(Some(code)),
        }
    }
}

fn print_question(view: &QuestionView) {
    println!("{}", view.prompt);
    match view.kind.as_str() {
        "single_choice" => {
            print_numbered(&view.options);
            println!("Answer with a number or the option text:");
        }
        "multiple_choice" => {
            print_numbered(&view.options);
            println!("Select all that apply, separated by commas:");
        }
        "numeric" => println!("Enter a number:"),
        "matching_pairs" => {
            for (i, item) in view.left.iter().enumerate() {
                println!("  {}. {item}", i + 1);
            }
            for (i, item) in view.right.iter().enumerate() {
                println!("  {}. {item}", letter(i));
            }
            println!("Match each number to a letter, e.g. 1a, 2b:");
        }
        _ => {
            if let Some(language) = view.language {
                println!("Language: {language}");
            }
            if let Some(template) = view.template.as_deref().filter(|t| !t.trim().is_empty()) {
                println!("{template}");
            }
            println!("Enter your code, then a line with only `{CODE_TERMINATOR}`:");
        }
    }
}

fn print_numbered(items: &[String]) {
    for (i, item) in items.iter().enumerate() {
        println!("  {}. {item}", i + 1);
    }
}

fn letter(i: usize) -> char {
    (b'a' + (i % 26) as u8) as char
}

fn print_feedback(feedback: &AnswerFeedback) {
    let outcome = &feedback.outcome;
    if outcome.correct {
        println!("Correct! +{} xp ({} total)", outcome.xp_awarded, feedback.experience);
    } else {
        println!("Wrong. {} heart(s) left", outcome.hearts_remaining);
    }
    if let Some(report) = &outcome.report {
        for error in &report.compile_errors {
            println!("  {error}");
        }
        for case in &report.cases {
            let mark = if case.passed { "pass" } else { "FAIL" };
            println!("  [{mark}] {}", case.name);
            if !case.passed && !case.message.is_empty() {
                println!("         {}", case.message.lines().next().unwrap_or(""));
            }
        }
    }
    if let Some(explanation) = &outcome.explanation {
        println!("  {explanation}");
    }
}

fn print_summary(engine: &questpath_core::LearningEngine, summary: &SessionSummary) {
    let outcome = &summary.outcome;
    let verdict = if outcome.passed { "Passed" } else { "Failed" };
    println!(
        "\n{verdict}: {}/{} correct, {} xp earned, {} heart(s) left",
        outcome.correct_count, outcome.question_count, outcome.xp_earned, outcome.hearts_remaining
    );
    println!(
        "Now at {} xp, tier {}",
        summary.progress.experience, summary.progress.tier
    );
    for id in &summary.new_achievements {
        let description = engine
            .achievements()
            .rule(id)
            .map(|r| r.description.as_str())
            .unwrap_or("");
        println!("  Achievement unlocked: {id} {description}");
    }
}

/// Turn a typed answer into an [`Answer`] of the question's kind.
///
/// Choices may be given by 1-based number or by option text.
pub fn parse_answer(view: &QuestionView, raw: &str) -> Result<Answer> {
    let input = raw.trim();
    match view.kind.as_str() {
        "single_choice" => Ok(Answer::Choice(pick_option(&view.options, input)?)),
        "multiple_choice" => {
            let choices = input
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| pick_option(&view.options, s))
                .collect::<Result<Vec<_>>>()?;
            if choices.is_empty() {
                bail!("select at least one option");
            }
            Ok(Answer::Choices(choices))
        }
        "numeric" => {
            let value: f64 = input
                .parse()
                .with_context(|| format!("'{input}' is not a number"))?;
            Ok(Answer::Number(value))
        }
        "matching_pairs" => {
            let pairs = input
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_pair(view, s))
                .collect::<Result<Vec<_>>>()?;
            if pairs.is_empty() {
                bail!("give at least one pair");
            }
            Ok(Answer::Pairs(pairs))
        }
        "code_completion" => {
            if raw.trim().is_empty() {
                bail!("code answer is empty");
            }
            Ok(Answer::Code(raw.to_string()))
        }
        other => bail!("unsupported question type '{other}'"),
    }
}

/// Option text wins over position, so numeric options like "12" can be typed.
/// An exact match comes first; a case-insensitive one is taken only when it
/// is unambiguous.
fn pick_option(options: &[String], input: &str) -> Result<String> {
    if let Some(option) = options.iter().find(|o| o.as_str() == input) {
        return Ok(option.clone());
    }
    let mut folded = options.iter().filter(|o| o.eq_ignore_ascii_case(input));
    match (folded.next(), folded.next()) {
        (Some(option), None) => return Ok(option.clone()),
        (Some(_), Some(_)) => bail!("'{input}' matches more than one option; type it exactly"),
        _ => {}
    }
    let Ok(n) = input.parse::<usize>() else {
        bail!("'{input}' is not one of the options");
    };
    n.checked_sub(1)
        .and_then(|i| options.get(i))
        .cloned()
        .with_context(|| format!("choose a number between 1 and {}", options.len()))
}

/// `1a` style: left item number followed by right item letter.
fn parse_pair(view: &QuestionView, input: &str) -> Result<MatchPair> {
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .with_context(|| format!("'{input}' should look like 1a"))?;
    let (number, rest) = input.split_at(split);
    let left = number
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| view.left.get(i))
        .with_context(|| format!("no left item '{number}'"))?;

    let rest = rest.trim();
    let mut chars = rest.chars();
    let right = match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_lowercase() => view.right.get((c as u8 - b'a') as usize),
        _ => None,
    }
    .with_context(|| format!("no right item '{rest}'"))?;

    Ok(MatchPair::new(left.clone(), right.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(kind: &str) -> QuestionView {
        QuestionView {
            id: "q".into(),
            prompt: "?".into(),
            kind: kind.into(),
            options: vec!["red".into(), "green".into(), "blue".into()],
            left: vec!["O(1)".into(), "O(n)".into()],
            right: vec!["constant".into(), "linear".into()],
            template: None,
            language: None,
        }
    }

    #[test]
    fn single_choice_by_number_or_text() {
        let v = view("single_choice");
        assert_eq!(parse_answer(&v, "2").unwrap(), Answer::Choice("green".into()));
        assert_eq!(parse_answer(&v, " Blue ").unwrap(), Answer::Choice("blue".into()));
        assert!(parse_answer(&v, "4").is_err());
        assert!(parse_answer(&v, "purple").is_err());
    }

    #[test]
    fn options_differing_by_case() {
        let mut v = view("single_choice");
        v.options = vec!["SELECT".into(), "select".into(), "Where".into()];
        assert_eq!(parse_answer(&v, "select").unwrap(), Answer::Choice("select".into()));
        assert_eq!(parse_answer(&v, "SELECT").unwrap(), Answer::Choice("SELECT".into()));
        assert_eq!(parse_answer(&v, "where").unwrap(), Answer::Choice("Where".into()));
        assert!(parse_answer(&v, "Select").is_err());
        assert_eq!(parse_answer(&v, "2").unwrap(), Answer::Choice("select".into()));
    }

    #[test]
    fn multiple_choice_list() {
        let v = view("multiple_choice");
        assert_eq!(
            parse_answer(&v, "1, blue").unwrap(),
            Answer::Choices(vec!["red".into(), "blue".into()])
        );
        assert!(parse_answer(&v, " , ").is_err());
    }

    #[test]
    fn numeric_answer() {
        let v = view("numeric");
        assert_eq!(parse_answer(&v, "2.5").unwrap(), Answer::Number(2.5));
        assert!(parse_answer(&v, "two").is_err());
    }

    #[test]
    fn matching_pairs_by_number_and_letter() {
        let v = view("matching_pairs");
        assert_eq!(
            parse_answer(&v, "1a, 2b").unwrap(),
            Answer::Pairs(vec![
                MatchPair::new("O(1)", "constant"),
                MatchPair::new("O(n)", "linear"),
            ])
        );
        assert!(parse_answer(&v, "3a").is_err());
        assert!(parse_answer(&v, "1z").is_err());
        assert!(parse_answer(&v, "a1").is_err());
    }

    #[test]
    fn code_answer_kept_verbatim() {
        let v = view("code_completion");
        let code = "def f():\n    return 1\n";
        assert_eq!(parse_answer(&v, code).unwrap(), Answer::Code(code.into()));
        assert!(parse_answer(&v, "\n").is_err());
    }
}
