//! Operator confirmation before any device is touched

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Ask on stdout, read the answer from stdin
pub async fn confirm(question: &str) -> Result<bool> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    ask(question, &mut stdin, &mut stdout).await
}

/// Write the prompt and read one line. End of input counts as no.
pub async fn ask<R, W>(question: &str, input: &mut R, output: &mut W) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output.write_all(format!("{} [y/N]: ", question).as_bytes()).await?;
    output.flush().await?;

    let mut answer = String::new();
    let read = input.read_line(&mut answer).await?;
    if read == 0 {
        return Ok(false);
    }
    Ok(is_affirmative(&answer))
}

/// Only an explicit `y` proceeds
pub fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}
