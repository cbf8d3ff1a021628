// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::ContextError;

/// Identity of the account and region the forwarder runs in. Every batch
/// carries these as attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionContext {
    pub realm: String,
    pub account_id: String,
    pub region: String,
}

impl ExecutionContext {
    /// Parses `arn:<realm>:lambda:<region>:<account>:function:<name>[:<qualifier>]`.
    pub fn from_function_arn(arn: &str) -> Result<Self, ContextError> {
        let parts: Vec<&str> = arn.split(':').collect();
        if !(7..=8).contains(&parts.len()) {
            return Err(ContextError::InvalidArn(arn.to_string()));
        }
        Ok(ExecutionContext {
            realm: parts[1].to_string(),
            account_id: parts[4].to_string(),
            region: parts[3].to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unqualified_arn() {
        let context = ExecutionContext::from_function_arn(
            "arn:aws:lambda:us-east-1:123456789012:function:log-forwarder",
        )
        .unwrap();

        assert_eq!(context.realm, "aws");
        assert_eq!(context.region, "us-east-1");
        assert_eq!(context.account_id, "123456789012");
    }

    #[test]
    fn test_parse_qualified_arn() {
        let context = ExecutionContext::from_function_arn(
            "arn:aws-cn:lambda:cn-north-1:210987654321:function:log-forwarder:$LATEST",
        )
        .unwrap();

        assert_eq!(context.realm, "aws-cn");
        assert_eq!(context.region, "cn-north-1");
        assert_eq!(context.account_id, "210987654321");
    }

    #[test]
    fn test_reject_malformed_arn() {
        for arn in [
            "",
            "arn:aws:lambda:us-east-1:123456789012",
            "arn:aws:lambda:us-east-1:123456789012:function:name:1:extra",
        ] {
            let err = ExecutionContext::from_function_arn(arn).unwrap_err();
            assert!(matches!(err, ContextError::InvalidArn(ref value) if value == arn));
        }
    }
}
