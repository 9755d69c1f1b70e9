use crate::host::MemoryHost;

/// Bound on `%s`/`%ws` string reads through a guest pointer argument, so a
/// corrupt pointer can't make formatting scan memory forever.
const MAX_PRINTF_STRING_LEN: usize = 1024;

/// Renders a HyperDbg `printf` format string against `args`, consuming one
/// argument per specifier in `%s %ws %d %u %x %o %b %llx %llu %c`. A `%s`/
/// `%ws` argument is treated as a guest pointer dereferenced through `host`;
/// an invalid pointer renders as `<invalid>` for that specifier only (the
/// rest of the format string still renders) per spec §4.4.
pub fn format_printf(fmt: &str, args: &[u64], host: &dyn MemoryHost) -> String {
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();
    let mut arg_iter = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut spec = String::new();
        // collect the specifier greedily: ll-prefixed forms first, then
        // single-character forms; `w` prefixes a wide-string specifier.
        if chars.peek() == Some(&'l') {
            spec.push(chars.next().unwrap());
            if chars.peek() == Some(&'l') {
                spec.push(chars.next().unwrap());
            }
        } else if chars.peek() == Some(&'w') {
            spec.push(chars.next().unwrap());
        }
        let Some(kind) = chars.next() else {
            out.push('%');
            out.push_str(&spec);
            break;
        };
        spec.push(kind);

        let Some(&value) = arg_iter.next() else {
            out.push('%');
            out.push_str(&spec);
            continue;
        };

        render_specifier(&mut out, &spec, value, host);
    }

    out
}

fn render_specifier(out: &mut String, spec: &str, value: u64, host: &dyn MemoryHost) {
    match spec {
        "s" => match host.read_cstring(value, MAX_PRINTF_STRING_LEN) {
            Some(s) => out.push_str(&s),
            None => out.push_str("<invalid>"),
        },
        "ws" => match host.read_wide_cstring(value, MAX_PRINTF_STRING_LEN) {
            Some(s) => out.push_str(&s),
            None => out.push_str("<invalid>"),
        },
        "d" => out.push_str(&(value as i32).to_string()),
        "u" => out.push_str(&(value as u32).to_string()),
        "x" => out.push_str(&format!("{:x}", value as u32)),
        "o" => out.push_str(&format!("{:o}", value as u32)),
        "b" => out.push_str(&format!("{:b}", value as u32)),
        "llx" => out.push_str(&format!("{:x}", value)),
        "llu" => out.push_str(&value.to_string()),
        "c" => out.push(char::from_u32(value as u8 as u32).unwrap_or('?')),
        other => {
            out.push('%');
            out.push_str(other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullMemoryHost;

    #[test]
    fn decimal_and_hex_specifiers() {
        let s = format_printf("%d and %x", &[10, 0x10], &NullMemoryHost);
        assert_eq!(s, "10 and 10");
    }

    #[test]
    fn llx_uses_full_64_bits() {
        let s = format_printf("%llx", &[0xdead_beef_0000_0001], &NullMemoryHost);
        assert_eq!(s, "deadbeef0000001");
    }

    #[test]
    fn invalid_string_pointer_renders_placeholder() {
        let s = format_printf("%s", &[0x1234], &NullMemoryHost);
        assert_eq!(s, "<invalid>");
    }

    #[test]
    fn missing_argument_leaves_specifier_literal() {
        let s = format_printf("%d %d", &[1], &NullMemoryHost);
        assert_eq!(s, "1 %d");
    }
}
