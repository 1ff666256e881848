//! HS256 JWT bearer tokens.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use crate::domain::{TokenClaims, TokenCodec, TokenError};

pub struct JwtTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtTokenCodec {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Sessions renew on use, so the session record decides expiry
        validation.validate_exp = false;
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl TokenCodec for JwtTokenCodec {
    fn issue(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    fn decode(&self, token: &str) -> Result<TokenClaims, TokenError> {
        decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> TokenClaims {
        TokenClaims {
            sub: "user-1".to_string(),
            sid: "session-1".to_string(),
            iat: 1_700_000_000,
            exp: 1_700_003_600,
        }
    }

    #[test]
    fn test_issue_then_decode() {
        // テスト項目: 発行したトークンを同じ秘密鍵で検証でき、3 セグメント構造になっている
        // given (前提条件):
        let codec = JwtTokenCodec::new("secret");

        // when (操作):
        let token = codec.issue(&claims()).unwrap();
        let decoded = codec.decode(&token).unwrap();

        // then (期待する結果):
        assert_eq!(token.split('.').count(), 3);
        assert_eq!(decoded, claims());
    }

    #[test]
    fn test_decode_rejects_foreign_signature() {
        // テスト項目: 別の秘密鍵で署名されたトークンは拒否される
        // given (前提条件):
        let token = JwtTokenCodec::new("other").issue(&claims()).unwrap();

        // when (操作):
        let result = JwtTokenCodec::new("secret").decode(&token);

        // then (期待する結果):
        assert!(matches!(result, Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        // テスト項目: JWT 形式でない文字列は拒否される
        let codec = JwtTokenCodec::new("secret");

        assert!(codec.decode("a.b").is_err());
        assert!(codec.decode("").is_err());
    }
}
