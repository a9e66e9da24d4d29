//! Shared script fixtures for tests

/// Helper-object script: reverse, slice 26, reverse
pub const FIXTURE: &str = r#"var x=1;function X(a){a=a.split("");B.B0(a,1);B.x9(a,26);B.B0(a,3);return a.join("")};var B={B0:function(a){a.reverse()},x9:function(a,b){a.splice(0,b)},yG:function(a,b){var c=a[0];a[0]=a[b%a.length];a[b%a.length]=c}};"#;

/// 97 mixed alphanumeric characters
pub const INPUT: &str =
    "ABCDEFGHIJKLMNabcdefghijklmnopqrstuvwxyz0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstu";

/// Throttle script whose `ncode` reverses its input
pub const THROTTLE_FIXTURE: &str =
    r#"var ncode=function(a){return a.split("").reverse().join("")};"#;

/// `reverse(slice_from(reverse(s), 26))`
pub fn expected_for(input: &str) -> String {
    let mut chars: Vec<char> = input.chars().rev().collect();
    chars.drain(..26);
    chars.into_iter().rev().collect()
}
