//! POSIX shell quoting for remote command strings

/// Quote a single word for a POSIX shell
///
/// Words made only of characters the shell never interprets are returned as-is;
/// everything else is wrapped in single quotes, with embedded single quotes
/// spliced in as `'\''`.
#[must_use]
pub fn posix_quote(word: &str) -> String {
    if !word.is_empty() && word.chars().all(is_plain) {
        return word.to_string();
    }

    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('\'');
    for c in word.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Quote every word and join with single spaces
#[must_use]
pub fn posix_join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| posix_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_plain(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | ',' | '+' | '%')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_words_unchanged() {
        assert_eq!(posix_quote("-appname"), "-appname");
        assert_eq!(posix_quote("/opt/helper/wrapper-5.jar"), "/opt/helper/wrapper-5.jar");
    }

    #[test]
    fn test_quotes_whitespace_and_empty() {
        assert_eq!(posix_quote("my app"), "'my app'");
        assert_eq!(posix_quote(""), "''");
    }

    #[test]
    fn test_escapes_single_quote() {
        assert_eq!(posix_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_shell_metacharacters_quoted() {
        assert_eq!(posix_quote("a;rm -rf /"), "'a;rm -rf /'");
        assert_eq!(posix_quote("$HOME"), "'$HOME'");
    }

    #[test]
    fn test_join() {
        assert_eq!(posix_join(&["java", "-jar", "my helper.jar"]), "java -jar 'my helper.jar'");
    }
}
