//! Check command for testing a URL against the allow-list.

use std::io::Write;
use std::rc::Rc;

use anyhow::Result;
use pw_core::{AllowList, base_url};
use pw_db::Database;

use super::runtime;

/// Prints whether `url` is exempt from idle termination.
pub fn run<W: Write>(writer: &mut W, db: Rc<Database>, url: &str) -> Result<()> {
    let Some(base) = base_url(url) else {
        writeln!(writer, "{url}: not excluded (no base URL)")?;
        return Ok(());
    };

    let excluded = runtime()?.block_on(AllowList::new(db).contains(url))?;
    let verdict = if excluded { "excluded" } else { "not excluded" };
    writeln!(writer, "{base}: {verdict}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(db: &Rc<Database>, url: &str) -> String {
        let mut out = Vec::new();
        run(&mut out, Rc::clone(db), url).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn reports_listed_and_unlisted_pages() {
        let db = Rc::new(Database::open_in_memory().unwrap());
        db.set_url_patterns(&["https://example.com".to_string()])
            .unwrap();

        assert_eq!(
            check(&db, "https://example.com/watch?v=1"),
            "https://example.com: excluded\n"
        );
        assert_eq!(
            check(&db, "https://other.test/"),
            "https://other.test: not excluded\n"
        );
    }

    #[test]
    fn unparseable_url_never_matches() {
        let db = Rc::new(Database::open_in_memory().unwrap());
        assert_eq!(check(&db, "nope"), "nope: not excluded (no base URL)\n");
    }
}
