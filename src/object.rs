//! The user-facing handle to a single remote object and its metadata/lifecycle operations.

use reqwest::header::CONTENT_LENGTH;

use crate::client::STORAGE_BASE;
use crate::models::{Entity, GoogleResponse, NewObjectAccessControl, ObjectAccessControl, Role};
use crate::{Client, Error, Object};

/// A handle to one object in one bucket, optionally pinned to a generation.
///
/// The handle itself is cheap and holds no network state. `metadata` is refreshed by every
/// operation that makes the server return object metadata, so after an upload or a
/// `read_metadata` it reflects what the server last said.
#[derive(Debug)]
pub struct ObjectHandle<'a> {
    client: &'a Client,
    bucket: String,
    name: String,
    generation: Option<i64>,
    /// The most recently observed metadata for this object, if any operation returned some.
    pub metadata: Option<Object>,
}

/// Where a copy should land.
///
/// The three shapes mirror what callers tend to have on hand: just a new name (same bucket), just
/// another bucket (same name), or both.
#[derive(Debug, Clone, Copy)]
pub enum CopyDestination<'a> {
    /// Copy within the same bucket under a new name.
    Name(&'a str),
    /// Copy to another bucket, keeping the object name.
    Bucket(&'a str),
    /// Copy to an arbitrary bucket and name.
    Object {
        /// The destination bucket.
        bucket: &'a str,
        /// The destination object name.
        name: &'a str,
    },
}

impl<'a> CopyDestination<'a> {
    fn resolve(&self, src_bucket: &str, src_name: &str) -> Result<(String, String), Error> {
        let (bucket, name) = match *self {
            CopyDestination::Name(name) => (src_bucket, name),
            CopyDestination::Bucket(bucket) => (bucket, src_name),
            CopyDestination::Object { bucket, name } => (bucket, name),
        };
        if bucket.is_empty() || name.is_empty() {
            return Err(Error::Validation(
                "a copy destination requires a bucket and an object name".to_string(),
            ));
        }
        Ok((bucket.to_string(), name.to_string()))
    }
}

impl<'a> ObjectHandle<'a> {
    pub(crate) fn new(client: &'a Client, bucket: &str, name: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            name: name.to_string(),
            generation: None,
            metadata: None,
        }
    }

    /// Pins every operation through this handle to one content generation: reads and deletes
    /// address it directly, writes carry it as an `ifGenerationMatch` precondition, and copies
    /// use it as the source generation.
    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// The bucket this handle addresses.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The object name this handle addresses.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The generation this handle is pinned to, if any.
    pub fn generation(&self) -> Option<i64> {
        self.generation
    }

    pub(crate) fn client(&self) -> &Client {
        self.client
    }

    pub(crate) fn check_addressable(&self) -> Result<(), Error> {
        if self.bucket.is_empty() {
            return Err(Error::Validation("a bucket name is required".to_string()));
        }
        if self.name.is_empty() {
            return Err(Error::Validation("an object name is required".to_string()));
        }
        if matches!(self.generation, Some(generation) if generation <= 0) {
            return Err(Error::Validation(
                "a generation must be a positive number".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn object_url(&self) -> String {
        format!(
            "{}/b/{}/o/{}",
            STORAGE_BASE,
            crate::percent_encode(&self.bucket),
            crate::percent_encode(&self.name),
        )
    }

    fn generation_query(&self) -> Vec<(&'static str, i64)> {
        self.generation.map(|g| ("generation", g)).into_iter().collect()
    }

    /// Fetches the object's metadata from the server and stores it on the handle.
    /// ### Example
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use gcs_objects::Client;
    ///
    /// let client = Client::default();
    /// let mut object = client.object("my_bucket", "path/to/my/file.png");
    /// let metadata = object.read_metadata().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn read_metadata(&mut self) -> Result<Object, Error> {
        self.check_addressable()?;
        let result: GoogleResponse<Object> = self
            .client
            .reqwest
            .get(self.object_url())
            .query(&self.generation_query())
            .headers(self.client.get_headers().await?)
            .send()
            .await?
            .json()
            .await?;
        let object = result.into_result()?;
        self.metadata = Some(object.clone());
        Ok(object)
    }

    /// Patches the object's metadata and stores the result on the handle.
    ///
    /// `patch` uses JSON merge semantics: present fields are replaced, `null` unsets a field,
    /// absent fields stay as they are.
    /// ### Example
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use gcs_objects::Client;
    ///
    /// let client = Client::default();
    /// let mut object = client.object("my_bucket", "file.xml");
    /// object.patch_metadata(serde_json::json!({ "contentType": "application/xml" })).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn patch_metadata(&mut self, patch: serde_json::Value) -> Result<Object, Error> {
        self.check_addressable()?;
        let result: GoogleResponse<Object> = self
            .client
            .reqwest
            .patch(self.object_url())
            .query(&self.generation_query())
            .headers(self.client.get_headers().await?)
            .json(&patch)
            .send()
            .await?
            .json()
            .await?;
        let object = result.into_result()?;
        self.metadata = Some(object.clone());
        Ok(object)
    }

    /// Deletes the object (or, when pinned, one generation of it).
    /// ### Example
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use gcs_objects::Client;
    ///
    /// let client = Client::default();
    /// client.object("my_bucket", "path/to/my/file.png").delete().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn delete(&self) -> Result<(), Error> {
        self.check_addressable()?;
        let response = self
            .client
            .reqwest
            .delete(self.object_url())
            .query(&self.generation_query())
            .headers(self.client.get_headers().await?)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Google(response.json().await?))
        }
    }

    /// Copies this object to `destination` and returns the copy's metadata.
    ///
    /// When the handle is pinned to a generation, that generation is the copy source.
    /// ### Example
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use gcs_objects::{Client, CopyDestination};
    ///
    /// let client = Client::default();
    /// let object = client.object("my_bucket", "file1");
    /// let copy = object.copy(CopyDestination::Name("file2")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn copy(&self, destination: CopyDestination<'_>) -> Result<Object, Error> {
        self.check_addressable()?;
        let (dest_bucket, dest_name) = destination.resolve(&self.bucket, &self.name)?;
        let url = format!(
            "{}/copyTo/b/{}/o/{}",
            self.object_url(),
            crate::percent_encode(&dest_bucket),
            crate::percent_encode(&dest_name),
        );
        let query: Vec<(&str, i64)> = self
            .generation
            .map(|g| ("sourceGeneration", g))
            .into_iter()
            .collect();
        let mut headers = self.client.get_headers().await?;
        headers.insert(CONTENT_LENGTH, "0".parse()?);
        let result: GoogleResponse<Object> = self
            .client
            .reqwest
            .post(&url)
            .query(&query)
            .headers(headers)
            .send()
            .await?
            .json()
            .await?;
        result.into_result()
    }

    /// Moves this object to `destination`: a copy followed by a delete of the source.
    ///
    /// The two steps are not atomic. If the delete fails after the copy succeeded, the delete
    /// error is returned and *both* objects exist; retrying the delete (or the whole move, which
    /// will overwrite the copy) is safe.
    /// ### Example
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use gcs_objects::{Client, CopyDestination};
    ///
    /// let client = Client::default();
    /// let mut object = client.object("my_bucket", "file1");
    /// let moved = object.move_to(CopyDestination::Bucket("my_other_bucket")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn move_to(&mut self, destination: CopyDestination<'_>) -> Result<Object, Error> {
        let copied = self.copy(destination).await?;
        self.delete().await?;
        self.metadata = None;
        Ok(copied)
    }

    /// Grants every user read access to this object by inserting an `allUsers` ACL entry.
    /// ### Example
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use gcs_objects::Client;
    ///
    /// let client = Client::default();
    /// client.object("my_bucket", "file1").make_public().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn make_public(&self) -> Result<ObjectAccessControl, Error> {
        self.check_addressable()?;
        let url = format!("{}/acl", self.object_url());
        let entry = NewObjectAccessControl {
            entity: Entity::AllUsers,
            role: Role::Reader,
        };
        let result: GoogleResponse<ObjectAccessControl> = self
            .client
            .reqwest
            .post(&url)
            .headers(self.client.get_headers().await?)
            .json(&entry)
            .send()
            .await?
            .json()
            .await?;
        result.into_result()
    }

    /// Drops all existing ACL entries by applying a predefined ACL: `private` when `strict`
    /// (only the owner keeps access), `projectPrivate` otherwise (project team members keep
    /// their project roles).
    ///
    /// The service refuses a `predefinedAcl` combined with an explicit `acl` list, so the patch
    /// body clears the list.
    pub async fn make_private(&mut self, strict: bool) -> Result<Object, Error> {
        self.check_addressable()?;
        let predefined_acl = if strict { "private" } else { "projectPrivate" };
        let result: GoogleResponse<Object> = self
            .client
            .reqwest
            .patch(self.object_url())
            .query(&[("predefinedAcl", predefined_acl)])
            .headers(self.client.get_headers().await?)
            .json(&serde_json::json!({ "acl": null }))
            .send()
            .await?
            .json()
            .await?;
        let object = result.into_result()?;
        self.metadata = Some(object.clone());
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_destinations_resolve_against_the_source() {
        let name = CopyDestination::Name("new.txt").resolve("b", "old.txt").unwrap();
        assert_eq!(name, ("b".to_string(), "new.txt".to_string()));

        let bucket = CopyDestination::Bucket("other").resolve("b", "old.txt").unwrap();
        assert_eq!(bucket, ("other".to_string(), "old.txt".to_string()));

        let full = CopyDestination::Object { bucket: "other", name: "new.txt" }
            .resolve("b", "old.txt")
            .unwrap();
        assert_eq!(full, ("other".to_string(), "new.txt".to_string()));
    }

    #[test]
    fn empty_copy_destinations_are_rejected() {
        assert!(CopyDestination::Name("").resolve("b", "old.txt").is_err());
        assert!(CopyDestination::Bucket("").resolve("b", "old.txt").is_err());
        assert!(CopyDestination::Object { bucket: "other", name: "" }
            .resolve("b", "old.txt")
            .is_err());
    }
}
