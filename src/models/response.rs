use super::ErrorResponse;

/// A response body from Google is either the resource asked for or an error envelope; both come
/// back with enough structure to tell them apart.
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
pub(crate) enum GoogleResponse<T> {
    Success(T),
    Error(ErrorResponse),
}

impl<T> GoogleResponse<T> {
    pub fn into_result(self) -> Result<T, crate::Error> {
        match self {
            GoogleResponse::Success(value) => Ok(value),
            GoogleResponse::Error(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::GoogleResponse;
    use crate::models::Object;

    #[test]
    fn deserializes_an_error_envelope() {
        let body = r#"{"error":{"errors":[{"domain":"global","reason":"required","message":"Login Required","locationType":"header","location":"Authorization"}],"code":401,"message":"Login Required"}}"#;
        let response: GoogleResponse<Object> = serde_json::from_str(body).unwrap();
        match response {
            GoogleResponse::Error(e) => assert_eq!(e.error.code, 401),
            GoogleResponse::Success(_) => panic!("an error envelope parsed as a success"),
        }
    }

    #[test]
    fn deserializes_an_object_resource() {
        let body = r#"{
            "kind": "storage#object",
            "id": "my-bucket/cloud.txt/1610000000000000",
            "selfLink": "https://www.googleapis.com/storage/v1/b/my-bucket/o/cloud.txt",
            "name": "cloud.txt",
            "bucket": "my-bucket",
            "generation": "1610000000000000",
            "metageneration": "1",
            "contentType": "text/plain",
            "timeCreated": "2021-01-07T06:13:20.000Z",
            "updated": "2021-01-07T06:13:20.000Z",
            "storageClass": "STANDARD",
            "timeStorageClassUpdated": "2021-01-07T06:13:20.000Z",
            "size": "5",
            "md5Hash": "XUFAKrxLKna5cZ2REBfFkg==",
            "mediaLink": "https://storage.googleapis.com/download/storage/v1/b/my-bucket/o/cloud.txt?generation=1610000000000000&alt=media",
            "crc32c": "mnG7TA==",
            "etag": "CAE="
        }"#;
        let response: GoogleResponse<Object> = serde_json::from_str(body).unwrap();
        match response {
            GoogleResponse::Success(object) => {
                assert_eq!(object.name, "cloud.txt");
                assert_eq!(object.size, 5);
                assert_eq!(object.generation, 1_610_000_000_000_000);
            }
            GoogleResponse::Error(e) => panic!("object resource parsed as error: {}", e),
        }
    }
}
