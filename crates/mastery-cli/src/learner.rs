//! Interactive learner that answers batteries on the terminal.

use std::collections::BTreeMap;
use std::io::Write;

use async_trait::async_trait;
use mastery_core::{AnswerSet, ExerciseBattery, Learner, MasteryError, RemediationContent, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Reads answers from stdin, one prompt per line.
pub struct TerminalLearner {
    lines: Lines<BufReader<Stdin>>,
}

impl Default for TerminalLearner {
    fn default() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl TerminalLearner {
    /// Prints `prompt` and reads one trimmed line.
    pub async fn ask(&mut self, prompt: &str) -> Result<String> {
        print!("{prompt}");
        std::io::stdout().flush()?;
        match self.lines.next_line().await? {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(MasteryError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stdin closed before the session finished",
            ))),
        }
    }

    /// Reads an index; blank or unparseable input counts as skipped.
    async fn ask_index(&mut self, prompt: &str, bound: usize) -> Result<Option<usize>> {
        let answer = self.ask(prompt).await?;
        Ok(answer.parse::<usize>().ok().filter(|i| *i < bound))
    }
}

#[async_trait]
impl Learner for TerminalLearner {
    async fn answer(&mut self, battery: &ExerciseBattery) -> Result<AnswerSet> {
        let mut answers = AnswerSet::new();

        println!("\n== Multiple choice ==");
        let mut selections = Vec::with_capacity(battery.multiple_choice.len());
        for q in &battery.multiple_choice {
            println!("\nQ: {}", q.question);
            for (i, option) in q.options.iter().enumerate() {
                println!("   {i}. {option}");
            }
            selections.push(self.ask_index("Your answer (index): ", q.options.len()).await?);
        }
        answers = answers.with_multiple_choice(selections);

        if let Some(cards) = &battery.term_definition {
            println!("\n== Terms ==");
            let mut definitions = Vec::with_capacity(cards.len());
            for card in cards {
                println!("\nTerm: {}", card.term);
                definitions.push(self.ask("Your definition: ").await?);
                println!("(Definition was: {})", card.definition);
            }
            answers = answers.with_term_definitions(definitions);
        }

        if let Some(categorize) = &battery.categorize {
            println!("\n== Categorize ==");
            for (i, bucket) in categorize.buckets.iter().enumerate() {
                println!("   {i}. {bucket}");
            }
            let mut choices = Vec::with_capacity(categorize.items.len());
            for item in &categorize.items {
                let prompt = format!("Sort \"{}\" into which bucket? ", item.text);
                choices.push(self.ask_index(&prompt, categorize.buckets.len()).await?);
            }
            answers = answers.with_categorize(choices);
        }

        if let Some(pairs) = &battery.pairing {
            println!("\n== Pairing ==");
            // Right-hand side is listed in reverse so position gives nothing away.
            let shown: Vec<usize> = (0..pairs.len()).rev().collect();
            println!("Connect these terms:");
            for (i, pair) in pairs.iter().enumerate() {
                println!("   {i}: {}", pair.left);
            }
            println!("To these descriptions:");
            for (display, original) in shown.iter().enumerate() {
                println!("   {display}: {}", pairs[*original].right);
            }
            let mut matches = Vec::with_capacity(pairs.len());
            for i in 0..pairs.len() {
                let prompt = format!("Match term {i} to description index: ");
                let display = self.ask_index(&prompt, pairs.len()).await?;
                matches.push(display.and_then(|d| shown.get(d).copied()));
            }
            answers = answers.with_pairing(matches);
        }

        if let Some(cloze) = &battery.cloze {
            println!("\n== Fill the gap ==");
            println!("\n{}", cloze.render_with_gaps());
            let mut filled = BTreeMap::new();
            for blank in &cloze.blanks {
                let text = self.ask(&format!("Fill in ({}): ", blank.id)).await?;
                if !text.is_empty() {
                    filled.insert(blank.id.clone(), text);
                }
            }
            answers = answers.with_cloze(filled);
        }

        println!("\n== Explain ==");
        println!("\n{}", battery.explain.prompt);
        let explanation = self.ask("Your explanation: ").await?;
        if !explanation.is_empty() {
            answers = answers.with_explanation(explanation);
        }

        Ok(answers)
    }

    async fn review(&mut self, remediation: &RemediationContent) -> Result<()> {
        println!();
        println!("Remedial lesson (attempt {})", remediation.attempt);
        println!("-----------------------------------");
        println!("{}", remediation.markdown.trim());
        println!("-----------------------------------");
        self.ask("Press Enter when you are ready to try again...").await?;
        Ok(())
    }
}
