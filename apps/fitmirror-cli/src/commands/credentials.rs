//! Where account credentials come from: a CSV of `username,password` lines,
//! or a single username with the password from the environment or stdin.

use std::io::{BufRead, Read};

use anyhow::{bail, ensure, Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use fitmirror_core::Credentials;

pub const PASSWORD_ENV: &str = "FITMIRROR_PASSWORD";

/// Parse credentials CSV content, calling `skipped` with every unusable line.
pub fn from_csv<R, F>(reader: R, mut skipped: F) -> Result<Vec<Credentials>>
where
    R: Read,
    F: FnMut(&str),
{
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let mut out = Vec::new();
    let mut record = StringRecord::new();
    loop {
        match rdr.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => match account(&record) {
                Some(creds) => out.push(creds),
                None => skipped(&record.iter().collect::<Vec<_>>().join(",")),
            },
            Err(err) if err.is_io_error() => {
                return Err(err).context("reading credentials file");
            }
            Err(err) => skipped(&err.to_string()),
        }
    }
    Ok(out)
}

fn account(record: &StringRecord) -> Option<Credentials> {
    if record.len() != 2 {
        return None;
    }
    let username = record.get(0)?;
    let password = record.get(1)?;
    if !is_usable_username(username) || password.is_empty() {
        return None;
    }
    Some(Credentials::new(username, password))
}

// Usernames name the per-account output directory.
pub fn is_usable_username(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Single account given on the command line.
pub fn from_args<R: BufRead>(
    username: &str,
    password_stdin: bool,
    stdin: R,
) -> Result<Credentials> {
    ensure!(
        is_usable_username(username),
        "username '{username}' cannot be used as a directory name"
    );
    let password = if password_stdin {
        read_password(stdin)?
    } else {
        match std::env::var(PASSWORD_ENV) {
            Ok(value) => value,
            Err(_) => bail!("no password: set {PASSWORD_ENV} or pass --password-stdin"),
        }
    };
    ensure!(!password.is_empty(), "empty password for {username}");
    Ok(Credentials::new(username, password))
}

fn read_password<R: BufRead>(mut stdin: R) -> Result<String> {
    let mut line = String::new();
    stdin
        .read_line(&mut line)
        .context("reading password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_lines_become_accounts() {
        let mut skipped = Vec::new();
        let creds = from_csv(
            "alice, pw1\nbob,pw2\n".as_bytes(),
            |line| skipped.push(line.to_string()),
        )
        .expect("parsed");
        assert_eq!(
            creds,
            vec![Credentials::new("alice", "pw1"), Credentials::new("bob", "pw2")]
        );
        assert!(skipped.is_empty());
    }

    #[test]
    fn malformed_lines_are_reported_and_skipped() {
        let mut skipped = Vec::new();
        let creds = from_csv(
            "alice,pw1\njust-a-name\ncarol,pw,extra\n../evil,pw\ndave,pw4\n".as_bytes(),
            |line| skipped.push(line.to_string()),
        )
        .expect("parsed");
        let names: Vec<_> = creds.iter().map(|c| c.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "dave"]);
        assert_eq!(
            skipped,
            vec!["just-a-name", "carol,pw,extra", "../evil,pw"]
        );
    }

    #[test]
    fn password_can_come_from_stdin() {
        let creds = from_args("runner", true, "s3cret\n".as_bytes()).expect("creds");
        assert_eq!(creds.password, "s3cret");
    }

    #[test]
    fn empty_stdin_password_is_rejected() {
        assert!(from_args("runner", true, "\n".as_bytes()).is_err());
    }

    #[test]
    fn usernames_must_be_plain_directory_names() {
        assert!(is_usable_username("runner@example.com"));
        assert!(!is_usable_username(".."));
        assert!(!is_usable_username("a/b"));
        assert!(from_args("a/b", true, "pw\n".as_bytes()).is_err());
    }
}
