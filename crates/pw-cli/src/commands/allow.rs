//! Allow command for editing the list of pages exempt from idle termination.

use std::io::Write;
use std::rc::Rc;

use anyhow::Result;
use pw_core::{AddOutcome, AllowList};
use pw_db::Database;

use super::runtime;

/// Prints the allow-list, one `index  url` per line or as a JSON array.
pub fn list<W: Write>(writer: &mut W, db: Rc<Database>, json: bool) -> Result<()> {
    let entries = runtime()?.block_on(AllowList::new(db).list())?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?;
        return Ok(());
    }

    if entries.is_empty() {
        writeln!(writer, "Allow-list is empty.")?;
        return Ok(());
    }

    for (index, entry) in entries.iter().enumerate() {
        writeln!(writer, "{index:>3}  {entry}")?;
    }
    Ok(())
}

pub fn add<W: Write>(writer: &mut W, db: Rc<Database>, url: &str) -> Result<()> {
    let outcome = runtime()?.block_on(AllowList::new(db).add(url))?;
    match outcome {
        AddOutcome::Added(entry) => writeln!(writer, "Added {entry}")?,
        AddOutcome::AlreadyPresent(entry) => writeln!(writer, "Already listed: {entry}")?,
    }
    Ok(())
}

pub fn remove<W: Write>(writer: &mut W, db: Rc<Database>, index: usize) -> Result<()> {
    let removed = runtime()?.block_on(AllowList::new(db).remove(index))?;
    writeln!(writer, "Removed {removed}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn add_list_remove_round_trip() {
        let db = Rc::new(Database::open_in_memory().unwrap());

        let out = output(|w| add(w, Rc::clone(&db), "https://example.com"));
        assert_eq!(out, "Added https://example.com\n");
        assert_eq!(db.url_patterns().unwrap(), vec!["https://example.com"]);

        let out = output(|w| remove(w, Rc::clone(&db), 0));
        assert_eq!(out, "Removed https://example.com\n");
        assert!(db.url_patterns().unwrap().is_empty());
    }

    #[test]
    fn list_shows_indexes() {
        let db = Rc::new(Database::open_in_memory().unwrap());
        output(|w| add(w, Rc::clone(&db), "https://b.test/path"));
        output(|w| add(w, Rc::clone(&db), "http://a.test:8080"));
        let out = output(|w| add(w, Rc::clone(&db), "https://b.test/other"));
        assert_eq!(out, "Already listed: https://b.test\n");

        let out = output(|w| list(w, Rc::clone(&db), false));
        assert_eq!(out, "  0  https://b.test\n  1  http://a.test\n");
    }

    #[test]
    fn list_as_json() {
        let db = Rc::new(Database::open_in_memory().unwrap());
        output(|w| add(w, Rc::clone(&db), "https://example.com"));

        let out = output(|w| list(w, db, true));
        let parsed: Vec<String> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, vec!["https://example.com"]);
    }

    #[test]
    fn empty_list_says_so() {
        let db = Rc::new(Database::open_in_memory().unwrap());
        let out = output(|w| list(w, db, false));
        assert_eq!(out, "Allow-list is empty.\n");
    }

    #[test]
    fn invalid_url_and_bad_index_are_errors() {
        let db = Rc::new(Database::open_in_memory().unwrap());
        let mut out = Vec::new();

        let err = add(&mut out, Rc::clone(&db), "example.com").unwrap_err();
        assert!(err.to_string().contains("not a valid URL"));

        let err = remove(&mut out, db, 0).unwrap_err();
        assert!(err.to_string().contains("no allow-list entry at index 0"));
    }
}
