//! 分隔表格文件的极简解析. 仅供 crate 内部的 catalog / subject 表加载使用.

/// 将一行逗号分隔文本拆分为字段. 支持双引号包裹的字段
/// (字段内的逗号不会被拆分, `""` 转义为一个引号).
pub(crate) fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    cur.push('"');
                } else {
                    quoted = false;
                }
            }
            '"' => quoted = true,
            ',' if !quoted => {
                fields.push(std::mem::take(&mut cur));
            }
            _ => cur.push(c),
        }
    }
    fields.push(cur);
    fields
}

/// 在表头字段中定位 `name` 列. 匹配时忽略首尾空白.
pub(crate) fn column_index(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|h| h.trim() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain() {
        assert_eq!(split_fields("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(split_fields("a,,c"), vec!["a", "", "c"]);
    }

    #[test]
    fn test_split_quoted() {
        assert_eq!(
            split_fields(r#"1,Amygdala,"(255, 0, 0)""#),
            vec!["1", "Amygdala", "(255, 0, 0)"]
        );
        assert_eq!(split_fields(r#""say ""hi""",x"#), vec![r#"say "hi""#, "x"]);
    }

    #[test]
    fn test_column_index() {
        let header = split_fields("ID,GENDER, AGE");
        assert_eq!(column_index(&header, "ID"), Some(0));
        assert_eq!(column_index(&header, "AGE"), Some(2));
        assert_eq!(column_index(&header, "NAME"), None);
    }
}
