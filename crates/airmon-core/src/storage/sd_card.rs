use embedded_sdmmc::{Error, Mode, SdCard, SdCardError, TimeSource, VolumeIdx, VolumeManager};
use log::{debug, error};

use super::{KeyValueStore, KvRecord, RECORD_BUF_LEN, StorageError};

/// Key/value namespace persisted as one file in the root directory of the
/// first FAT volume.
///
/// The SD card shares nothing with other tasks, so the blocking
/// `embedded-sdmmc` calls are made directly. They only happen at boot.
pub struct SdCardStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
    namespace: &'static str,
    /// 8.3 name of the backing file
    file_name: &'static str,
}

impl<S, D, T> SdCardStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    pub fn new(
        sd_card: SdCard<S, D>,
        ts: T,
        namespace: &'static str,
        file_name: &'static str,
    ) -> Self {
        Self {
            volume_mgr: VolumeManager::new(sd_card, ts),
            namespace,
            file_name,
        }
    }

    fn device_error(&self, operation: &'static str, e: Error<SdCardError>) -> StorageError {
        error!("SD card {} of {} failed: {:?}", operation, self.file_name, e);
        StorageError::Device { operation }
    }

    /// Read the raw record, `Ok(0)` if the file does not exist yet.
    fn read_file(&self, buf: &mut [u8]) -> Result<usize, Error<SdCardError>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;

        let file = match root_dir.open_file_in_dir(self.file_name, Mode::ReadOnly) {
            Ok(file) => file,
            Err(Error::NotFound) => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut len = 0;
        while len < buf.len() {
            let read = file.read(&mut buf[len..])?;
            if read == 0 {
                break;
            }
            len += read;
        }

        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(len)
    }

    fn write_file(&self, bytes: &[u8]) -> Result<(), Error<SdCardError>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(self.file_name, Mode::ReadWriteCreateOrTruncate)?;

        file.write(bytes)?;

        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(())
    }

    fn load(&self) -> Result<KvRecord, StorageError> {
        let mut buf = [0u8; RECORD_BUF_LEN];
        let len = self
            .read_file(&mut buf)
            .map_err(|e| self.device_error("read", e))?;

        if len == 0 {
            debug!("{} is empty, starting namespace {}", self.file_name, self.namespace);
            return KvRecord::new(self.namespace);
        }
        KvRecord::decode(&buf[..len], self.namespace)
    }
}

impl<S, D, T> KeyValueStore for SdCardStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    fn get_u64(&mut self, key: &str) -> Result<Option<u64>, StorageError> {
        Ok(self.load()?.get(key))
    }

    fn set_u64(&mut self, key: &str, value: u64) -> Result<(), StorageError> {
        let mut record = self.load()?;
        record.set(key, value)?;

        let mut buf = [0u8; RECORD_BUF_LEN];
        let encoded = record.encode(&mut buf)?;
        self.write_file(encoded)
            .map_err(|e| self.device_error("write", e))
    }
}
